//! HTTP fetcher implementation
//!
//! A [`Fetcher`] is one fetch-layer instance. It handles:
//! - Restricting requests to the allow-listed domains
//! - Serving GET requests from the shared on-disk cache
//! - Bounding its own concurrency
//! - Skipping URLs it has already visited
//! - Retrying rate-limited requests with cache invalidation

use crate::config::CrawlerSettings;
use crate::crawler::cache::{CacheError, CachedResponse, ResponseCache};
use crate::crawler::retry::{wait_or_cancel, RetryDecision, RetryPolicy};
use crate::state::{RequestContext, Stage};
use crate::url::AllowedDomains;
use crate::FetchError;
use reqwest::{Client, Method, StatusCode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A response that made it through the fetch layer
#[derive(Debug, Clone)]
pub struct Response {
    /// URL the request was made for
    pub url: Url,

    /// URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Page body content
    pub body: String,

    /// Whether the body came from the cache
    pub from_cache: bool,
}

/// Result of a fetch operation
pub type FetchResult = Result<Response, FetchError>;

/// A finished request together with the context it carried
#[derive(Debug)]
pub struct Fetched {
    pub url: Url,
    pub ctx: RequestContext,
    pub result: FetchResult,
}

/// Counter snapshot shared by a fetcher and all of its scoped clones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Responses received from the network
    pub pages_fetched: u64,

    /// Responses served from the cache
    pub cache_hits: u64,

    /// Retries performed after a rate-limited response
    pub retries: u64,
}

#[derive(Debug, Default)]
struct FetchCounters {
    pages_fetched: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
}

/// State common to every scoped clone
struct Shared {
    client: Client,
    allowed: AllowedDomains,
    cache: ResponseCache,
    policy: RetryPolicy,
    counters: FetchCounters,
    cancel: CancellationToken,
}

/// One fetch-layer instance
///
/// Cloning yields a handle to the same instance. Use
/// [`clone_scoped`](Fetcher::clone_scoped) for an independent instance.
#[derive(Clone)]
pub struct Fetcher {
    stage: Stage,
    shared: Arc<Shared>,
    semaphore: Arc<Semaphore>,
    visited: Arc<Mutex<HashSet<String>>>,
    max_concurrent: usize,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `settings` - Runtime settings (user agent, timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use scene_scraper::config::CrawlerSettings;
/// use scene_scraper::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerSettings::default()).unwrap();
/// ```
pub fn build_http_client(settings: &CrawlerSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

impl Fetcher {
    /// Creates the first fetcher of a run
    pub fn new(
        stage: Stage,
        client: Client,
        allowed: AllowedDomains,
        settings: &CrawlerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let shared = Shared {
            client,
            allowed,
            cache: ResponseCache::new(&settings.cache_dir),
            policy: RetryPolicy::from_settings(settings),
            counters: FetchCounters::default(),
            cancel,
        };

        Self {
            stage,
            shared: Arc::new(shared),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_requests)),
            visited: Arc::new(Mutex::new(HashSet::new())),
            max_concurrent: settings.max_concurrent_requests,
        }
    }

    /// An independent instance for another stage: own visited set and
    /// concurrency bound, same client, allow-list, cache and counters
    pub fn clone_scoped(&self, stage: Stage) -> Self {
        Self {
            stage,
            shared: Arc::clone(&self.shared),
            semaphore: Arc::new(Semaphore::new(self.max_concurrent)),
            visited: Arc::new(Mutex::new(HashSet::new())),
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.shared.cache
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.shared.allowed.allows(url)
    }

    pub fn stats(&self) -> FetchStats {
        let counters = &self.shared.counters;
        FetchStats {
            pages_fetched: counters.pages_fetched.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
        }
    }

    /// Marks `method url` as visited by this instance
    ///
    /// Returns false if it was already visited.
    pub fn mark_visited(&self, method: &Method, url: &Url) -> bool {
        let key = format!("{} {}", method, url);
        let mut visited = self.visited.lock().unwrap_or_else(|e| e.into_inner());
        visited.insert(key)
    }

    /// GETs `url` unless this instance already visited it
    ///
    /// Returns `None` for an already-visited URL.
    pub async fn visit(&self, url: Url, ctx: RequestContext) -> Option<Fetched> {
        if !self.mark_visited(&Method::GET, &url) {
            tracing::debug!(stage = %self.stage, "Already visited {}", url);
            return None;
        }
        Some(self.request(Method::GET, url, ctx).await)
    }

    /// Sends a request under the retry policy
    ///
    /// Skips the visited check, so it can also be used to resend.
    pub async fn request(&self, method: Method, url: Url, mut ctx: RequestContext) -> Fetched {
        let result = self.execute(&method, &url, &mut ctx).await;
        if let Err(e) = &result {
            match e {
                FetchError::RateLimitExhausted { .. } => tracing::warn!("{}", e),
                FetchError::Cancelled { .. } => tracing::debug!("{}", e),
                _ => tracing::warn!(stage = %self.stage, "Abandoned request: {}", e),
            }
        }
        Fetched { url, ctx, result }
    }

    async fn execute(&self, method: &Method, url: &Url, ctx: &mut RequestContext) -> FetchResult {
        if !self.allows(url) {
            ctx.abandon();
            return Err(FetchError::OutOfScope {
                url: url.to_string(),
            });
        }

        loop {
            if self.shared.cancel.is_cancelled() {
                ctx.abandon();
                return Err(FetchError::Cancelled {
                    url: url.to_string(),
                });
            }

            ctx.mark_sent();
            tracing::info!(stage = %self.stage, attempt = ctx.attempt(), "visiting {}", url);

            let response = match self.attempt(method, url).await {
                Ok(response) => response,
                Err(e) => {
                    ctx.abandon();
                    return Err(e);
                }
            };

            if response.status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
                match self.shared.policy.on_rate_limited(ctx) {
                    RetryDecision::Retry { attempt, delay } => {
                        tracing::warn!(
                            stage = %self.stage,
                            "Rate limited on {}, retry {} in {:?}",
                            url,
                            attempt - 1,
                            delay
                        );

                        if let Err(e) = self.shared.cache.invalidate(url.as_str()).await {
                            ctx.abandon();
                            return Err(cache_error(url, e));
                        }

                        self.shared.counters.retries.fetch_add(1, Ordering::Relaxed);

                        if !wait_or_cancel(delay, &self.shared.cancel).await {
                            ctx.abandon();
                            return Err(FetchError::Cancelled {
                                url: url.to_string(),
                            });
                        }
                        continue;
                    }
                    RetryDecision::GiveUp { attempts } => {
                        if let Err(e) = self.shared.cache.invalidate(url.as_str()).await {
                            tracing::warn!("Failed to drop cached 429 for {}: {}", url, e);
                        }
                        return Err(FetchError::RateLimitExhausted {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                }
            }

            if response.status >= 400 {
                ctx.abandon();
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: response.status,
                });
            }

            ctx.resolve();
            return Ok(response);
        }
    }

    /// One attempt: cache lookup for GET, otherwise a network round-trip
    async fn attempt(&self, method: &Method, url: &Url) -> FetchResult {
        let cacheable = *method == Method::GET;

        if cacheable {
            let cached = self
                .shared
                .cache
                .get(url.as_str())
                .await
                .map_err(|e| cache_error(url, e))?;

            if let Some(cached) = cached {
                self.shared.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                let final_url = Url::parse(&cached.final_url).unwrap_or_else(|_| url.clone());
                return Ok(Response {
                    url: url.clone(),
                    final_url,
                    status: cached.status,
                    body: cached.body,
                    from_cache: true,
                });
            }
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled {
                url: url.to_string(),
            })?;

        let send = self.shared.client.request(method.clone(), url.clone()).send();
        let response = tokio::select! {
            _ = self.shared.cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            response = send => response.map_err(|e| transport_error(url, e))?,
        };

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        if !self.allows(&final_url) {
            return Err(FetchError::OutOfScope {
                url: final_url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| transport_error(url, e))?;
        self.shared
            .counters
            .pages_fetched
            .fetch_add(1, Ordering::Relaxed);

        if cacheable {
            let entry = CachedResponse::new(status, final_url.as_str(), body.as_str());
            self.shared
                .cache
                .put(url.as_str(), &entry)
                .await
                .map_err(|e| cache_error(url, e))?;
        }

        Ok(Response {
            url: url.clone(),
            final_url,
            status,
            body,
            from_cache: false,
        })
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };

    FetchError::Transport {
        url: url.to_string(),
        message,
    }
}

fn cache_error(url: &Url, error: CacheError) -> FetchError {
    FetchError::Cache {
        url: url.to_string(),
        message: error.to_string(),
    }
}
