//! Configuration module for Scene-Scraper
//!
//! This module handles loading, parsing, and validating scraper definitions
//! (JSON or TOML) and the runtime [`CrawlerSettings`].
//!
//! # Example
//!
//! ```no_run
//! use scene_scraper::config::load_definition;
//! use std::path::Path;
//!
//! let definition = load_definition(Path::new("sites/example.json")).unwrap();
//! println!("Scraping {} from {}", definition.site_id, definition.start_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlerSettings, DetailStage, ExtractionDirective, ExtractionMethod, LinkStage,
    ScraperDefinition, SecondaryStage, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{
    compute_definition_hash, load_definition, load_definition_with_hash, parse_definition,
    DefinitionFormat,
};
pub use validation::{validate, validate_settings};
