use crate::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;

/// Declarative description of one site: where to start, which domains may be
/// fetched, and how each crawl stage finds its fragments.
///
/// Loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperDefinition {
    /// Identifier of this scraper definition
    pub scraper_id: String,

    /// Site name, copied into every record and used to build record ids
    pub site_id: String,

    /// Studio name, copied into every record
    #[serde(default)]
    pub studio: String,

    /// Site icon URL
    #[serde(default)]
    pub site_icon: String,

    /// Hosts that may be fetched (exact, or `*.example.com` wildcards)
    pub allowed_domains: Vec<String>,

    /// First URL visited
    pub start_url: String,

    /// Listing stage; omitted means single-record mode
    #[serde(default)]
    pub listing: Option<LinkStage>,

    /// Pagination stage, evaluated on listing pages
    #[serde(default)]
    pub pagination: Option<LinkStage>,

    /// Detail stage, the one that produces records
    pub detail: DetailStage,

    /// Optional stage that completes records on a second page
    #[serde(default)]
    pub secondary_detail: Option<SecondaryStage>,
}

impl ScraperDefinition {
    /// The listing stage, if it has a selector
    pub fn listing(&self) -> Option<&LinkStage> {
        self.listing.as_ref().filter(|s| s.is_configured())
    }

    /// The pagination stage, if it has a selector
    pub fn pagination(&self) -> Option<&LinkStage> {
        self.pagination.as_ref().filter(|s| s.is_configured())
    }

    /// The secondary-detail stage, if it has a selector
    pub fn secondary_detail(&self) -> Option<&SecondaryStage> {
        self.secondary_detail
            .as_ref()
            .filter(|s| !s.selector.trim().is_empty())
    }
}

/// A stage whose matches only yield URLs to follow (listing, pagination)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkStage {
    /// CSS selector for the link-bearing elements
    #[serde(default)]
    pub selector: String,

    /// Attribute holding the (possibly relative) URL
    #[serde(default)]
    pub visit_attr: String,

    /// URLs containing any of these substrings are never followed
    #[serde(default)]
    pub skip_url_contains: Vec<String>,

    /// Skip URLs the caller already knows about
    #[serde(default)]
    pub skip_known: bool,
}

impl LinkStage {
    pub fn is_configured(&self) -> bool {
        !self.selector.trim().is_empty()
    }
}

/// The record-producing stage
#[derive(Debug, Clone, Deserialize)]
pub struct DetailStage {
    pub selector: String,

    #[serde(default)]
    pub directives: Vec<ExtractionDirective>,
}

/// Secondary-detail stage: its own selector, script and directives
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecondaryStage {
    #[serde(default)]
    pub selector: String,

    /// Script path, relative to the directory of the detail script
    #[serde(default)]
    pub script: String,

    #[serde(default)]
    pub directives: Vec<ExtractionDirective>,
}

/// How one script variable is pulled out of a matched fragment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDirective")]
pub struct ExtractionDirective {
    /// Name the value is bound to inside the script
    pub var_name: String,

    /// Extraction method with its arguments
    pub method: ExtractionMethod,
}

/// Closed set of extraction methods. Selectors are relative to the matched
/// fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Trimmed concatenated text of all matching descendants
    ChildText { selector: String },
    /// Trimmed text of each matching descendant
    ChildTexts { selector: String },
    /// Trimmed attribute of the first matching descendant ("" if absent)
    ChildAttr { selector: String, attr: String },
    /// Trimmed attribute of every matching descendant that has it
    ChildAttrs { selector: String, attr: String },
}

impl ExtractionMethod {
    /// The descendant selector this method evaluates
    pub fn selector(&self) -> &str {
        match self {
            Self::ChildText { selector }
            | Self::ChildTexts { selector }
            | Self::ChildAttr { selector, .. }
            | Self::ChildAttrs { selector, .. } => selector,
        }
    }

    /// Whether this method yields a list rather than a scalar
    pub fn is_list(&self) -> bool {
        matches!(self, Self::ChildTexts { .. } | Self::ChildAttrs { .. })
    }
}

/// Wire form of a directive: `{ "var_name", "method", "args" }`
#[derive(Debug, Deserialize)]
struct RawDirective {
    var_name: String,
    method: String,
    #[serde(default)]
    args: Vec<String>,
}

impl TryFrom<RawDirective> for ExtractionDirective {
    type Error = ConfigError;

    fn try_from(raw: RawDirective) -> Result<Self, Self::Error> {
        let invalid = |message: String| ConfigError::InvalidDirective {
            var_name: raw.var_name.clone(),
            message,
        };

        if raw.var_name.trim().is_empty() {
            return Err(invalid("var_name cannot be empty".to_string()));
        }

        let expected = match raw.method.as_str() {
            "child_text" | "ChildText" | "child_texts" | "ChildTexts" => 1,
            "child_attr" | "ChildAttr" | "child_attrs" | "ChildAttrs" => 2,
            other => return Err(invalid(format!("unknown extraction method '{}'", other))),
        };

        if raw.args.len() != expected {
            return Err(invalid(format!(
                "method '{}' takes {} argument(s), got {}",
                raw.method,
                expected,
                raw.args.len()
            )));
        }

        let mut args = raw.args.iter().cloned();
        let selector = args.next().unwrap_or_default();
        let attr = args.next().unwrap_or_default();

        let method = match raw.method.as_str() {
            "child_text" | "ChildText" => ExtractionMethod::ChildText { selector },
            "child_texts" | "ChildTexts" => ExtractionMethod::ChildTexts { selector },
            "child_attr" | "ChildAttr" => ExtractionMethod::ChildAttr { selector, attr },
            _ => ExtractionMethod::ChildAttrs { selector, attr },
        };

        Ok(Self {
            var_name: raw.var_name,
            method,
        })
    }
}

/// Runtime knobs that are not part of a site definition
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    /// Root of the on-disk response cache
    pub cache_dir: PathBuf,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Retries allowed for a rate-limited request
    pub max_retries: u32,

    /// Fixed wait before each retry (milliseconds)
    pub retry_delay_ms: u64,

    /// Concurrent requests per fetcher instance
    pub max_concurrent_requests: usize,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Capacity of the record output channel
    pub output_buffer: usize,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/73.0.3683.103 Safari/537.36";

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./scraper_cache"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 15,
            retry_delay_ms: 2000,
            max_concurrent_requests: 4,
            request_timeout_secs: 30,
            output_buffer: 64,
        }
    }
}
