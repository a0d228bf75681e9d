//! Scene-Scraper: a configuration-driven metadata scraper
//!
//! This crate crawls multi-page sites described by a declarative
//! [`ScraperDefinition`] and turns matched page fragments into
//! [`OutputRecord`]s by running a small embedded transformation script.
//! Crawling is staged (listing, pagination, detail, optional secondary
//! detail) and rate-limited responses are retried with cache invalidation.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;
pub mod script;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Scene-Scraper operations
///
/// Only fatal conditions surface here. Per-request failures are recorded in
/// the [`crawler::CrawlReport`] and the run continues.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] crawler::CacheError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Output stream closed by consumer")]
    OutputClosed,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Crawl task failed: {0}")]
    TaskFailed(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid extraction directive '{var_name}': {message}")]
    InvalidDirective { var_name: String, message: String },
}

/// Script sandbox errors. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to compile script {path}: {message}")]
    Compile { path: String, message: String },

    #[error("Script failed while processing {url}: {message}")]
    Runtime { url: String, message: String },

    #[error("Script output '{key}' has type {found}, expected {expected}")]
    Output {
        key: String,
        expected: &'static str,
        found: String,
    },
}

/// Errors for a single request. These never abort a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("URL not in allowed domains: {url}")]
    OutOfScope { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Rate limited on every attempt, gave up on {url} after {attempts} attempts")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("Cache error for {url}: {message}")]
    Cache { url: String, message: String },

    #[error("Request cancelled: {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// The URL the failed request was for
    pub fn url(&self) -> &str {
        match self {
            Self::OutOfScope { url }
            | Self::Http { url, .. }
            | Self::Transport { url, .. }
            | Self::RateLimitExhausted { url, .. }
            | Self::Cache { url, .. }
            | Self::Cancelled { url } => url,
        }
    }
}

/// Result type alias for Scene-Scraper operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for script operations
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

// Re-export commonly used types
pub use config::{CrawlerSettings, ScraperDefinition};
pub use crawler::{CrawlReport, Dispatcher, RunOptions};
pub use record::OutputRecord;
pub use state::{RequestContext, Stage};
