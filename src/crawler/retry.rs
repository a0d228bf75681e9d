//! Rate-limit retry policy
//!
//! | Condition | Action |
//! |-----------|--------|
//! | 429, attempt <= max_retries | Invalidate cache entry, wait, resend with attempt + 1 |
//! | 429, attempt > max_retries | Abandon, report `RateLimitExhausted` |
//! | Any other status >= 400 | Abandon immediately |
//! | Transport error | Abandon immediately |

use crate::config::CrawlerSettings;
use crate::state::RequestContext;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to do after a rate-limited response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resend after `delay`; `attempt` is the number of the next attempt
    Retry { attempt: u32, delay: Duration },

    /// Stop; `attempts` requests were sent in total
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_settings(settings: &CrawlerSettings) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_millis(settings.retry_delay_ms),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Applies the policy to a request whose current attempt was answered
    /// with a rate-limit status, updating its context
    pub fn on_rate_limited(&self, ctx: &mut RequestContext) -> RetryDecision {
        ctx.mark_rate_limited();

        let attempt = ctx.attempt();
        if attempt <= self.max_retries {
            RetryDecision::Retry {
                attempt: ctx.advance_attempt(),
                delay: self.delay,
            }
        } else {
            ctx.abandon();
            RetryDecision::GiveUp { attempts: attempt }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&CrawlerSettings::default())
    }
}

/// Sleeps for `delay` unless `cancel` fires first
///
/// Returns false if the wait was cancelled.
pub async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
