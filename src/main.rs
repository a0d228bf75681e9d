//! Scene-Scraper main entry point
//!
//! This is the command-line interface for the Scene-Scraper metadata
//! scraper.

use anyhow::{Context, Result};
use clap::Parser;
use scene_scraper::config::{load_definition_with_hash, validate_settings, CrawlerSettings};
use scene_scraper::crawler::{spawn_scrape, Dispatcher, RunOptions};
use scene_scraper::output::{
    drain_records, print_statistics, JsonLinesSink, RecordSink, SqliteSink,
};
use scene_scraper::script::{ScriptEngine, StageScripts};
use scene_scraper::ScraperDefinition;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Scene-Scraper: a configuration-driven metadata scraper
///
/// Crawls a site described by a scraper definition (JSON or TOML), runs the
/// transformation script on every matched detail fragment and writes one
/// record per scene.
#[derive(Parser, Debug)]
#[command(name = "scene-scraper")]
#[command(version = "1.0.0")]
#[command(about = "A configuration-driven metadata scraper", long_about = None)]
struct Cli {
    /// Path to the scraper definition (.json or .toml)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Path to the detail-stage script
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Write records as JSON lines to this file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Also store records in this SQLite database
    #[arg(long, value_name = "DB")]
    sqlite: Option<PathBuf>,

    /// Response cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Retries for a rate-limited request
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Wait before each retry, in milliseconds
    #[arg(long, value_name = "MS")]
    retry_delay_ms: Option<u64>,

    /// Concurrent requests per stage
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// File of already-known URLs (one per line) for stages with skip_known
    #[arg(long, value_name = "FILE")]
    known: Option<PathBuf>,

    /// Validate the definition and scripts without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading definition from: {}", cli.config.display());
    let (definition, definition_hash) = load_definition_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!(
        "Definition {} loaded (hash: {})",
        definition.scraper_id,
        definition_hash
    );

    let settings = build_settings(&cli);
    validate_settings(&settings)?;

    let engine = ScriptEngine::new();
    let scripts = StageScripts::load(&engine, &definition, &cli.script)?;

    if cli.dry_run {
        handle_dry_run(&definition, &settings, &scripts);
        return Ok(());
    }

    handle_scrape(&cli, definition, &definition_hash, scripts, settings).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so records can be piped from stdout.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scene_scraper=info,warn"),
            1 => EnvFilter::new("scene_scraper=debug,info"),
            2 => EnvFilter::new("scene_scraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides to the default settings
fn build_settings(cli: &Cli) -> CrawlerSettings {
    let mut settings = CrawlerSettings::default();

    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        settings.max_retries = max_retries;
    }
    if let Some(delay) = cli.retry_delay_ms {
        settings.retry_delay_ms = delay;
    }
    if let Some(concurrency) = cli.concurrency {
        settings.max_concurrent_requests = concurrency;
    }

    settings
}

/// Reads a known-URL list: one URL per line, blank lines and `#` comments
/// ignored
fn load_known_urls(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read known URLs from {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(
    definition: &ScraperDefinition,
    settings: &CrawlerSettings,
    scripts: &StageScripts,
) {
    println!("=== Scene-Scraper Dry Run ===\n");

    println!("Scraper: {} ({})", definition.scraper_id, definition.site_id);
    if !definition.studio.is_empty() {
        println!("Studio: {}", definition.studio);
    }
    println!("Start URL: {}", definition.start_url);
    println!("Allowed domains: {}", definition.allowed_domains.join(", "));

    println!("\nStages:");
    match definition.listing() {
        Some(listing) => println!("  listing: {} @{}", listing.selector, listing.visit_attr),
        None => println!("  listing: (none, start URL is a detail page)"),
    }
    if let Some(pagination) = definition.pagination() {
        println!(
            "  pagination: {} @{}",
            pagination.selector, pagination.visit_attr
        );
    }
    println!(
        "  detail: {} ({} directives, script {})",
        definition.detail.selector,
        definition.detail.directives.len(),
        scripts.detail.name()
    );
    if let (Some(stage), Some(script)) = (definition.secondary_detail(), &scripts.secondary) {
        println!(
            "  secondary_detail: {} ({} directives, script {})",
            stage.selector,
            stage.directives.len(),
            script.name()
        );
    }

    println!("\nSettings:");
    println!("  Cache: {}", settings.cache_dir.display());
    println!(
        "  Retries: {} x {}ms",
        settings.max_retries, settings.retry_delay_ms
    );
    println!(
        "  Concurrency per stage: {}",
        settings.max_concurrent_requests
    );

    println!("\n✓ Definition and scripts are valid");
}

/// Handles the main scrape operation
async fn handle_scrape(
    cli: &Cli,
    definition: ScraperDefinition,
    definition_hash: &str,
    scripts: StageScripts,
    settings: CrawlerSettings,
) -> Result<()> {
    let known_urls = match &cli.known {
        Some(path) => load_known_urls(path)?,
        None => HashSet::new(),
    };
    if !known_urls.is_empty() {
        tracing::info!("Loaded {} known URLs", known_urls.len());
    }

    let mut sinks: Vec<Box<dyn RecordSink + Send>> = Vec::new();
    let to_stdout = cli.output.is_none();
    match &cli.output {
        Some(path) => sinks.push(Box::new(JsonLinesSink::create(path)?)),
        None => sinks.push(Box::new(JsonLinesSink::new(std::io::stdout()))),
    }
    if let Some(path) = &cli.sqlite {
        sinks.push(Box::new(SqliteSink::open(
            path,
            &definition.scraper_id,
            definition_hash,
        )?));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    let buffer = settings.output_buffer;
    let options = RunOptions { known_urls, cancel };
    let dispatcher = Dispatcher::new(definition, scripts, settings, options)?;

    let (handle, records) = spawn_scrape(dispatcher, buffer);
    let drained = drain_records(records, &mut sinks).await;
    let outcome = handle.await.context("Scrape task failed")?;

    match (outcome, drained) {
        (Ok(report), Ok(_)) => {
            sinks.finish(&report)?;
            if !to_stdout {
                print_statistics(&report);
            }
            if !report.is_clean() {
                tracing::warn!(
                    "{} requests failed, {} records dropped",
                    report.total_failures(),
                    report.dropped_records.len()
                );
            }
            Ok(())
        }
        (_, Err(sink_error)) => {
            sinks.abort(&sink_error.to_string())?;
            Err(sink_error).context("Failed to write records")
        }
        (Err(e), Ok(_)) => {
            tracing::error!("Scrape failed: {}", e);
            sinks.abort(&e.to_string())?;
            Err(e.into())
        }
    }
}
