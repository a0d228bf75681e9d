//! Domain helper library exposed to scripts as the `helpers` module
//!
//! ```text
//! let minutes = helpers::parse_duration(raw_duration);
//! let released = helpers::format_date(raw_date, "%B %d, %Y");
//! let cast = helpers::trim_all(cast_names);
//! ```

use crate::url::{canonical_url, resolve_url};
use chrono::NaiveDate;
use rhai::{Array, Dynamic, EvalAltResult, Map, Module};
use url::Url;

/// Namespace the helper module is registered under
pub const HELPERS_NAMESPACE: &str = "helpers";

type HelperResult<T> = Result<T, Box<EvalAltResult>>;

/// Builds the helper module. Installed once per engine, before any compile.
pub fn build_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("trim_all", rhai_trim_all);
    module.set_native_fn("split_trim", rhai_split_trim);
    module.set_native_fn("parse_duration", rhai_parse_duration);
    module.set_native_fn("format_date", rhai_format_date);
    module.set_native_fn("template", rhai_template);
    module.set_native_fn("absolute_url", rhai_absolute_url);
    module.set_native_fn("strip_query", rhai_strip_query);
    module.set_native_fn("unique", rhai_unique);

    module
}

fn rhai_trim_all(items: Array) -> HelperResult<Array> {
    Ok(items
        .into_iter()
        .map(|item| Dynamic::from(item.to_string().trim().to_string()))
        .collect())
}

fn rhai_split_trim(text: &str, separator: &str) -> HelperResult<Array> {
    Ok(split_trim(text, separator)
        .into_iter()
        .map(Dynamic::from)
        .collect())
}

fn rhai_parse_duration(text: &str) -> HelperResult<i64> {
    Ok(parse_duration(text))
}

fn rhai_format_date(text: &str, input_format: &str) -> HelperResult<String> {
    Ok(format_date(text, input_format))
}

fn rhai_template(template: &str, values: Map) -> HelperResult<String> {
    let pairs: Vec<(String, String)> = values
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(render_template(template, &pairs))
}

fn rhai_absolute_url(base: &str, href: &str) -> HelperResult<String> {
    Ok(Url::parse(base)
        .ok()
        .and_then(|base| resolve_url(href, &base))
        .map(|u| u.to_string())
        .unwrap_or_default())
}

fn rhai_strip_query(url: &str) -> HelperResult<String> {
    Ok(match Url::parse(url) {
        Ok(parsed) => canonical_url(&parsed),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    })
}

fn rhai_unique(items: Array) -> HelperResult<Array> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Array::new();
    for item in items {
        let key = item.to_string();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(item);
        }
    }
    Ok(out)
}

/// Splits on `separator`, trims each piece and drops empty ones
pub fn split_trim(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Duration in whole minutes from `H:MM:SS`, `MM:SS`, `"45 min"` or a bare
/// number of minutes. Unparseable input gives 0.
pub fn parse_duration(text: &str) -> i64 {
    let text = text.trim();

    if text.contains(':') {
        let parts: Option<Vec<i64>> = text
            .split(':')
            .map(|p| p.trim().parse::<i64>().ok())
            .collect();
        let seconds = match parts.as_deref() {
            Some([h, m, s]) => clock_seconds(*h, *m, *s),
            Some([m, s]) => clock_seconds(0, *m, *s),
            _ => None,
        };
        return seconds.map(|s| s / 60).unwrap_or(0);
    }

    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().unwrap_or(0)
}

/// Total seconds of a clock reading; `None` on overflow
fn clock_seconds(hours: i64, minutes: i64, seconds: i64) -> Option<i64> {
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Reformats a date to `YYYY-MM-DD`. Unparseable input gives "".
pub fn format_date(text: &str, input_format: &str) -> String {
    NaiveDate::parse_from_str(text.trim(), input_format)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Replaces each `{key}` with its value
pub fn render_template(template: &str, values: &[(String, String)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
