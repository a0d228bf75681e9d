use crate::script::ScriptValue;
use crate::ScriptError;
use rhai::{Dynamic, Scope};

/// Typed values read back from the sandbox after a run
///
/// Keys the script never set read as empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub site_id: String,
    pub cast: Vec<String>,
    pub cover_url: ScriptValue,
    pub duration: i64,
    pub filenames: Vec<String>,
    pub gallery_urls: Vec<String>,
    pub homepage_url: String,
    pub released: String,
    pub synopsis: String,
    pub tags: Vec<String>,
    pub title: String,
    pub extra_url: String,
}

impl ScriptOutput {
    /// Reads every output key from a scope the script has run in
    pub fn from_scope(scope: &Scope) -> Result<Self, ScriptError> {
        Ok(Self {
            site_id: read_text(scope, "site_id")?,
            cast: read_list(scope, "cast")?,
            cover_url: read_text_or_list(scope, "cover_url")?,
            duration: read_int(scope, "duration")?,
            filenames: read_list(scope, "filenames")?,
            gallery_urls: read_list(scope, "gallery_urls")?,
            homepage_url: read_text(scope, "homepage_url")?,
            released: read_text(scope, "released")?,
            synopsis: read_text(scope, "synopsis")?,
            tags: read_list(scope, "tags")?,
            title: read_text(scope, "title")?,
            extra_url: read_text(scope, "extra_url")?,
        })
    }
}

fn lookup<'a>(scope: &'a Scope, key: &str) -> Option<&'a Dynamic> {
    scope.get(key).filter(|value| !value.is_unit())
}

fn mismatch(key: &str, expected: &'static str, found: &Dynamic) -> ScriptError {
    ScriptError::Output {
        key: key.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

fn read_text(scope: &Scope, key: &str) -> Result<String, ScriptError> {
    match lookup(scope, key) {
        None => Ok(String::new()),
        Some(value) if value.is_string() => value
            .clone()
            .into_string()
            .map_err(|_| mismatch(key, "string", value)),
        Some(value) if value.is_int() || value.is_float() => Ok(value.to_string()),
        Some(value) => Err(mismatch(key, "string", value)),
    }
}

fn read_list(scope: &Scope, key: &str) -> Result<Vec<String>, ScriptError> {
    match lookup(scope, key) {
        None => Ok(Vec::new()),
        Some(value) if value.is_array() => {
            let items = value
                .clone()
                .into_array()
                .map_err(|_| mismatch(key, "array of strings", value))?;
            items
                .into_iter()
                .map(|item| {
                    if item.is_string() {
                        item.clone()
                            .into_string()
                            .map_err(|_| mismatch(key, "array of strings", &item))
                    } else {
                        Err(mismatch(key, "array of strings", &item))
                    }
                })
                .collect()
        }
        Some(value) => Err(mismatch(key, "array of strings", value)),
    }
}

fn read_text_or_list(scope: &Scope, key: &str) -> Result<ScriptValue, ScriptError> {
    match lookup(scope, key) {
        Some(value) if value.is_array() => read_list(scope, key).map(ScriptValue::List),
        _ => read_text(scope, key).map(ScriptValue::Text),
    }
}

fn read_int(scope: &Scope, key: &str) -> Result<i64, ScriptError> {
    match lookup(scope, key) {
        None => Ok(0),
        Some(value) if value.is_int() => value
            .as_int()
            .map(|v| v as i64)
            .map_err(|_| mismatch(key, "integer", value)),
        Some(value) if value.is_float() => value
            .as_float()
            .map(|v| v as i64)
            .map_err(|_| mismatch(key, "integer", value)),
        Some(value) if value.is_string() => {
            let text = value.to_string();
            let text = text.trim();
            if text.is_empty() {
                return Ok(0);
            }
            Ok(text.parse::<i64>().unwrap_or_else(|_| {
                tracing::debug!("Script output '{}' is not a number: {:?}", key, text);
                0
            }))
        }
        Some(value) => Err(mismatch(key, "integer", value)),
    }
}
