//! URL handling module for Scene-Scraper
//!
//! Host extraction, allowed-domain matching, canonical page URLs and
//! resolution of attribute values into absolute URLs.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::matches_wildcard;
pub use normalize::{canonical_url, find_skip_match, resolve_url};

use url::Url;

/// The set of hosts a scraper may fetch from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedDomains {
    patterns: Vec<String>,
}

impl AllowedDomains {
    /// Builds the allow-list from configured patterns (case-insensitive)
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Returns true if the URL's host matches any allowed pattern
    ///
    /// An empty allow-list allows nothing.
    pub fn allows(&self, url: &Url) -> bool {
        match extract_domain(url) {
            Some(host) => self.allows_host(&host),
            None => false,
        }
    }

    /// Returns true if the (lowercase) host matches any allowed pattern
    pub fn allows_host(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| matches_wildcard(p, host))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
