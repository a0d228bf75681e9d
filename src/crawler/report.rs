use crate::FetchError;
use std::fmt;
use std::time::Duration;

/// Why a candidate URL was not visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Contains a configured skip substring
    SkipRule(String),

    /// Present in the caller-supplied known-URL set
    Known,

    /// Host not in the allow-list (directly or after a redirect)
    OutOfScope,

    /// Attribute value did not resolve to an http(s) URL
    Unresolvable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipRule(substring) => write!(f, "matched skip rule '{}'", substring),
            Self::Known => f.write_str("already known"),
            Self::OutOfScope => f.write_str("outside allowed domains"),
            Self::Unresolvable => f.write_str("not a valid http(s) URL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: SkipReason,
}

/// Outcome of a run
///
/// Every request that was given up on shows up here; nothing is dropped
/// silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Responses received from the network
    pub pages_fetched: u64,

    /// Responses served from the cache
    pub cache_hits: u64,

    /// Retries after rate-limited responses
    pub retries: u64,

    /// Pages handed to a stage handler
    pub pages_processed: u64,

    /// Records sent to the output stream
    pub records_emitted: u64,

    /// Visits skipped because the fetcher had already visited the URL
    pub duplicates: u64,

    pub skipped: Vec<SkippedUrl>,

    /// Requests abandoned after a non-rate-limit failure
    pub failures: Vec<FetchError>,

    /// URLs still rate-limited after the last retry
    pub rate_limit_exhausted: Vec<String>,

    /// Pages where the stage selector matched nothing
    pub unmatched_pages: Vec<String>,

    /// Ids of records lost because their secondary page failed
    pub dropped_records: Vec<String>,

    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn skip(&mut self, url: impl Into<String>, reason: SkipReason) {
        let url = url.into();
        tracing::debug!("Skipping {}: {}", url, reason);
        self.skipped.push(SkippedUrl { url, reason });
    }

    /// Files a failed request under the matching bucket
    pub fn record_failure(&mut self, error: FetchError) {
        match error {
            FetchError::RateLimitExhausted { url, .. } => self.rate_limit_exhausted.push(url),
            FetchError::OutOfScope { url } => self.skip(url, SkipReason::OutOfScope),
            FetchError::Cancelled { .. } => {}
            other => self.failures.push(other),
        }
    }

    /// Requests that produced nothing because of an error
    pub fn total_failures(&self) -> usize {
        self.failures.len() + self.rate_limit_exhausted.len()
    }

    /// Returns true if no request failed and no record was dropped
    pub fn is_clean(&self) -> bool {
        self.total_failures() == 0 && self.dropped_records.is_empty()
    }
}
