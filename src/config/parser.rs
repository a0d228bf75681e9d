use crate::config::types::ScraperDefinition;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Document formats accepted for scraper definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Toml,
}

impl DefinitionFormat {
    /// Picks the format from the file extension; unknown extensions are JSON
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Loads, parses and validates a scraper definition
///
/// # Arguments
///
/// * `path` - Path to a `.json` or `.toml` definition
///
/// # Returns
///
/// * `Ok(ScraperDefinition)` - Valid definition
/// * `Err(ConfigError)` - Failed to read, parse or validate the document
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use scene_scraper::config::load_definition;
///
/// let definition = load_definition(Path::new("sites/example.json")).unwrap();
/// println!("Starting at {}", definition.start_url);
/// ```
pub fn load_definition(path: &Path) -> Result<ScraperDefinition, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_definition(&content, DefinitionFormat::from_path(path))
}

/// Parses and validates a definition from an in-memory document
pub fn parse_definition(
    content: &str,
    format: DefinitionFormat,
) -> Result<ScraperDefinition, ConfigError> {
    let definition: ScraperDefinition = match format {
        DefinitionFormat::Json => serde_json::from_str(content)?,
        DefinitionFormat::Toml => toml::from_str(content)?,
    };

    validate(&definition)?;

    Ok(definition)
}

/// Computes a SHA-256 hash of the definition file content
///
/// Recorded with each run so outputs can be traced back to the exact
/// definition that produced them.
pub fn compute_definition_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a definition and returns it together with its hash
pub fn load_definition_with_hash(path: &Path) -> Result<(ScraperDefinition, String), ConfigError> {
    let definition = load_definition(path)?;
    let hash = compute_definition_hash(path)?;
    Ok((definition, hash))
}
