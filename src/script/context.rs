use crate::url::canonical_url;
use url::Url;

/// Name under which the canonical page URL is bound
pub const HOMEPAGE_URL_VAR: &str = "homepage_url";

/// Name under which the full request URL is bound
pub const FULL_HOMEPAGE_URL_VAR: &str = "full_homepage_url";

/// A value bound into a script: one string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Text(String),
    List(Vec<String>),
}

impl Default for ScriptValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ScriptValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

/// Input bindings for one script invocation
///
/// Rebuilt for every matched fragment. Always carries the canonical page
/// URL (query stripped) and the full request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    vars: Vec<(String, ScriptValue)>,
    homepage_url: String,
    full_homepage_url: String,
}

impl ScriptContext {
    pub fn new(page_url: &Url) -> Self {
        Self {
            vars: Vec::new(),
            homepage_url: canonical_url(page_url),
            full_homepage_url: page_url.to_string(),
        }
    }

    /// Binds a variable, replacing an earlier binding of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: ScriptValue) {
        let name = name.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.vars.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Directive-bound variables in declaration order
    pub fn vars(&self) -> impl Iterator<Item = (&str, &ScriptValue)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn homepage_url(&self) -> &str {
        &self.homepage_url
    }

    pub fn full_homepage_url(&self) -> &str {
        &self.full_homepage_url
    }
}
