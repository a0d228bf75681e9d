//! Run statistics derived from a [`CrawlReport`]

use crate::crawler::{CrawlReport, SkipReason};
use std::collections::BTreeMap;

/// Share of handled requests that produced a usable page, in percent
pub fn success_rate(report: &CrawlReport) -> f64 {
    let attempted = report.pages_processed + report.total_failures() as u64;
    if attempted == 0 {
        return 0.0;
    }
    (report.pages_processed as f64 / attempted as f64) * 100.0
}

/// Skip counts grouped by reason
pub fn skip_breakdown(report: &CrawlReport) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for skipped in &report.skipped {
        let key = match &skipped.reason {
            SkipReason::SkipRule(_) => "skip rule".to_string(),
            other => other.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report of a finished run
pub fn print_statistics(report: &CrawlReport) {
    println!("=== Scrape Statistics ===\n");

    println!("Overview:");
    println!("  Records emitted: {}", report.records_emitted);
    println!("  Pages processed: {}", report.pages_processed);
    println!("  Fetched from network: {}", report.pages_fetched);
    println!("  Served from cache: {}", report.cache_hits);
    println!("  Retries after rate limiting: {}", report.retries);
    println!("  Duplicate visits skipped: {}", report.duplicates);
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();

    let breakdown = skip_breakdown(report);
    if !breakdown.is_empty() {
        println!("Skipped URLs ({}):", report.skipped.len());
        for (reason, count) in &breakdown {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failed Requests ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  - {}", failure);
        }
        println!();
    }

    if !report.rate_limit_exhausted.is_empty() {
        println!(
            "Rate Limited, Gave Up ({}):",
            report.rate_limit_exhausted.len()
        );
        for url in &report.rate_limit_exhausted {
            println!("  - {}", url);
        }
        println!();
    }

    if !report.dropped_records.is_empty() {
        println!("Dropped Records ({}):", report.dropped_records.len());
        for id in &report.dropped_records {
            println!("  - {}", id);
        }
        println!();
    }

    if !report.unmatched_pages.is_empty() {
        println!("Pages With No Matches ({}):", report.unmatched_pages.len());
        for url in &report.unmatched_pages {
            println!("  - {}", url);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} requests produced a page)",
        success_rate(report),
        report.pages_processed,
        report.pages_processed + report.total_failures() as u64
    );
}
