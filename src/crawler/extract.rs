//! Fragment extraction
//!
//! Stage selectors are matched against a parsed page; for each matched
//! fragment the stage's directives pull text or attribute values into a
//! [`ScriptContext`].

use crate::config::{ExtractionDirective, ExtractionMethod};
use crate::script::{ScriptContext, ScriptValue};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Parses a CSS selector, mapping failures to a config error
pub fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// A directive with its selector parsed once per run
#[derive(Debug, Clone)]
pub struct CompiledDirective {
    var_name: String,
    method: ExtractionMethod,
    selector: Selector,
}

impl CompiledDirective {
    pub fn compile(directive: &ExtractionDirective) -> Result<Self, ConfigError> {
        let selector = parse_selector(directive.method.selector()).map_err(|e| {
            ConfigError::InvalidDirective {
                var_name: directive.var_name.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            var_name: directive.var_name.clone(),
            method: directive.method.clone(),
            selector,
        })
    }

    pub fn var_name(&self) -> &str {
        &self.var_name
    }

    /// Evaluates the directive against one matched fragment
    pub fn extract(&self, fragment: ElementRef<'_>) -> ScriptValue {
        let mut matches = fragment.select(&self.selector);

        match &self.method {
            ExtractionMethod::ChildText { .. } => {
                let text: String = matches.map(|el| el.text().collect::<String>()).collect();
                ScriptValue::Text(text.trim().to_string())
            }
            ExtractionMethod::ChildTexts { .. } => {
                ScriptValue::List(matches.map(|el| element_text(&el)).collect())
            }
            ExtractionMethod::ChildAttr { attr, .. } => ScriptValue::Text(
                matches
                    .next()
                    .and_then(|el| el.value().attr(attr))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default(),
            ),
            ExtractionMethod::ChildAttrs { attr, .. } => ScriptValue::List(
                matches
                    .filter_map(|el| el.value().attr(attr))
                    .map(|v| v.trim().to_string())
                    .collect(),
            ),
        }
    }
}

/// Compiles every directive of a stage
pub fn compile_directives(
    directives: &[ExtractionDirective],
) -> Result<Vec<CompiledDirective>, ConfigError> {
    directives.iter().map(CompiledDirective::compile).collect()
}

/// Builds the script bindings for one matched fragment
pub fn build_context(
    fragment: ElementRef<'_>,
    directives: &[CompiledDirective],
    page_url: &Url,
) -> ScriptContext {
    let mut ctx = ScriptContext::new(page_url);
    for directive in directives {
        let value = directive.extract(fragment);
        tracing::trace!("{} = {:?}", directive.var_name(), value);
        ctx.insert(directive.var_name(), value);
    }
    ctx
}

/// Values of `attr` on every element matching `selector`
///
/// Elements without the attribute, or with an empty value, are ignored.
pub fn select_attr_values(document: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Trimmed concatenated text of an element
pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
