//! Crawler module: fetching, caching and stage dispatch
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with rate-limit retries and cache invalidation
//! - The content-addressed response cache
//! - Fragment extraction for script bindings
//! - The stage dispatcher that drives a run

mod cache;
mod dispatcher;
mod extract;
mod fetcher;
mod report;
mod retry;

pub use cache::{CacheError, CachedResponse, ResponseCache};
pub use dispatcher::{Action, Dispatcher, RunOptions};
pub use extract::{
    build_context, compile_directives, element_text, parse_selector, select_attr_values,
    CompiledDirective,
};
pub use fetcher::{build_http_client, FetchResult, FetchStats, Fetched, Fetcher, Response};
pub use report::{CrawlReport, SkipReason, SkippedUrl};
pub use retry::{wait_or_cancel, RetryDecision, RetryPolicy};

use crate::record::OutputRecord;
use crate::ScrapeError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Starts a run on its own task
///
/// Returns the task handle and the receiving end of the record stream. The
/// caller must keep draining the receiver or the run stalls.
///
/// # Example
///
/// ```no_run
/// use scene_scraper::crawler::{spawn_scrape, Dispatcher};
///
/// # async fn example(dispatcher: Dispatcher) -> Result<(), Box<dyn std::error::Error>> {
/// let (handle, mut records) = spawn_scrape(dispatcher, 64);
/// while let Some(record) = records.recv().await {
///     println!("{}", record.id);
/// }
/// let report = handle.await??;
/// println!("{} records", report.records_emitted);
/// # Ok(())
/// # }
/// ```
pub fn spawn_scrape(
    dispatcher: Dispatcher,
    buffer: usize,
) -> (
    JoinHandle<Result<CrawlReport, ScrapeError>>,
    mpsc::Receiver<OutputRecord>,
) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let handle = tokio::spawn(dispatcher.run(tx));
    (handle, rx)
}
