//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full scrape cycle end-to-end.

use scene_scraper::config::{parse_definition, CrawlerSettings, DefinitionFormat};
use scene_scraper::crawler::{spawn_scrape, ResponseCache, SkipReason};
use scene_scraper::record::generate_id;
use scene_scraper::script::{ScriptEngine, StageScripts};
use scene_scraper::{CrawlReport, Dispatcher, OutputRecord, RunOptions, ScrapeError, ScraperDefinition};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DETAIL_SCRIPT: &str = r#"
let site_id = raw_id;
let title = raw_title;
let cover_url = helpers::absolute_url(full_homepage_url, raw_cover);
let filenames = raw_files;
let extra_url = raw_extra;
"#;

const FILES_SCRIPT: &str = r#"
let filenames = names;
let title = "Not The Title";
"#;

fn scene_page(id: &str, title: &str, files: &[&str]) -> String {
    let files: String = files
        .iter()
        .map(|f| format!("<li class=\"file\">{}</li>", f))
        .collect();
    format!(
        r#"<html><body>
            <article class="scene">
                <span class="id">{id}</span>
                <h1>{title}</h1>
                <img class="cover" src="/img/{id}.jpg">
                <ul>{files}</ul>
                <a class="files" href="/files/{id}">Downloads</a>
            </article>
        </body></html>"#
    )
}

fn listing_page(links: &[&str], next: Option<&str>) -> String {
    let cards: String = links
        .iter()
        .map(|l| format!("<div class=\"card\"><a href=\"{}\">scene</a></div>", l))
        .collect();
    let next = next
        .map(|n| format!("<a class=\"next\" href=\"{}\">next</a>", n))
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", cards, next)
}

fn detail_stage() -> serde_json::Value {
    json!({
        "selector": "article.scene",
        "directives": [
            { "var_name": "raw_id", "method": "child_text", "args": ["span.id"] },
            { "var_name": "raw_title", "method": "child_text", "args": ["h1"] },
            { "var_name": "raw_cover", "method": "child_attr", "args": ["img.cover", "src"] },
            { "var_name": "raw_files", "method": "child_texts", "args": ["li.file"] },
            { "var_name": "raw_extra", "method": "child_attr", "args": ["a.files", "href"] }
        ]
    })
}

fn definition(document: serde_json::Value) -> ScraperDefinition {
    parse_definition(&document.to_string(), DefinitionFormat::Json)
        .expect("Failed to parse definition")
}

fn base_document(start_url: String) -> serde_json::Value {
    json!({
        "scraper_id": "example-vr",
        "site_id": "Example VR",
        "studio": "Example Studio",
        "allowed_domains": ["127.0.0.1"],
        "start_url": start_url,
        "detail": detail_stage()
    })
}

fn write_scripts(dir: &Path) -> std::path::PathBuf {
    std::fs::write(dir.join("files.rhai"), FILES_SCRIPT).unwrap();
    let detail = dir.join("detail.rhai");
    std::fs::write(&detail, DETAIL_SCRIPT).unwrap();
    detail
}

fn settings(dir: &TempDir) -> CrawlerSettings {
    CrawlerSettings {
        cache_dir: dir.path().join("cache"),
        retry_delay_ms: 5,
        ..Default::default()
    }
}

async fn scrape(
    definition: ScraperDefinition,
    dir: &TempDir,
    options: RunOptions,
) -> (Result<CrawlReport, ScrapeError>, Vec<OutputRecord>) {
    let engine = ScriptEngine::new();
    let detail_path = write_scripts(dir.path());
    let scripts = StageScripts::load(&engine, &definition, &detail_path).unwrap();
    let dispatcher = Dispatcher::new(definition, scripts, settings(dir), options).unwrap();

    let (handle, mut rx) = spawn_scrape(dispatcher, 4);
    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    let outcome = handle.await.expect("scrape task panicked");

    records.sort_by(|a, b| a.id.cmp(&b.id));
    (outcome, records)
}

#[tokio::test]
async fn test_single_record_without_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/101"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(scene_page("101", " First Scene ", &[])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let start = format!("{}/scene/101", server.uri());
    let (outcome, records) =
        scrape(definition(base_document(start.clone())), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, generate_id("Example VR", "101"));
    assert_eq!(record.site_local_id, "101");
    assert_eq!(record.site, "Example VR");
    assert_eq!(record.studio, "Example Studio");
    assert_eq!(record.kind, "VR");
    assert_eq!(record.title, "First Scene");
    assert_eq!(record.covers, vec![format!("{}/img/101.jpg", server.uri())]);
    assert_eq!(record.homepage_url, start);

    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.pages_fetched, 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_listing_follows_links_and_applies_skip_rules() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &["/scene/1", "/scene/2", "/trailer/3"],
            Some("/videos/page/2"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    // Second page links back to a scene that is already queued
    Mock::given(method("GET"))
        .and(path("/videos/page/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(&["/scene/1"], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    for (id, title) in [("1", "Scene One"), ("2", "Scene Two")] {
        Mock::given(method("GET"))
            .and(path(format!("/scene/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(scene_page(id, title, &[])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/trailer/3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut document = base_document(format!("{}/videos", server.uri()));
    document["listing"] = json!({
        "selector": "div.card a",
        "visit_attr": "href",
        "skip_url_contains": ["/trailer"]
    });
    document["pagination"] = json!({ "selector": "a.next", "visit_attr": "href" });

    let (outcome, records) = scrape(definition(document), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Scene One", "Scene Two"]);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::SkipRule("/trailer".to_string())
    );
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.records_emitted, 2);
}

#[tokio::test]
async fn test_known_urls_are_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(&["/scene/1", "/scene/2"], None)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/scene/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(scene_page("1", "One", &[])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/scene/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(scene_page("2", "Two", &[])))
        .expect(0)
        .mount(&server)
        .await;

    let mut document = base_document(format!("{}/videos", server.uri()));
    document["listing"] = json!({
        "selector": "div.card a",
        "visit_attr": "href",
        "skip_known": true
    });

    let options = RunOptions {
        known_urls: [format!("{}/scene/2", server.uri())].into_iter().collect(),
        ..Default::default()
    };

    let (outcome, records) = scrape(definition(document), &dir, options).await;
    let report = outcome.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "One");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::Known);
}

#[tokio::test]
async fn test_secondary_stage_only_fills_missing_fields() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let page = format!(
        "<html><body>{}{}</body></html>",
        scene_page("1", "Scene One", &["scene1.mp4"]),
        scene_page("2", "Scene Two", &[])
    );
    Mock::given(method("GET"))
        .and(path("/scenes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    for id in ["1", "2"] {
        let body = format!(
            r#"<html><body><section class="downloads">
                <span class="name">scene{id}_a.mp4</span>
                <span class="name">scene{id}_b.mp4</span>
            </section></body></html>"#
        );
        Mock::given(method("GET"))
            .and(path(format!("/files/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut document = base_document(format!("{}/scenes", server.uri()));
    document["secondary_detail"] = json!({
        "selector": "section.downloads",
        "script": "files.rhai",
        "directives": [
            { "var_name": "names", "method": "child_texts", "args": ["span.name"] }
        ]
    });

    let (outcome, records) = scrape(definition(document), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].title, "Scene One");
    assert_eq!(records[0].filenames, vec!["scene1.mp4"]);
    assert_eq!(records[1].title, "Scene Two");
    assert_eq!(records[1].filenames, vec!["scene2_a.mp4", "scene2_b.mp4"]);
    assert!(report.dropped_records.is_empty());
}

#[tokio::test]
async fn test_shared_secondary_url_completes_every_record() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let page = ["1", "2"]
        .iter()
        .map(|id| {
            scene_page(id, &format!("Scene {}", id), &[])
                .replace(&format!("/files/{}", id), "/files/shared")
        })
        .collect::<String>();
    Mock::given(method("GET"))
        .and(path("/scenes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    // The second hand-off is a fresh fetch or a cache hit, never a skip
    Mock::given(method("GET"))
        .and(path("/files/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><section class="downloads">
                <span class="name">pack.zip</span>
            </section></body></html>"#,
        ))
        .expect(1..=2)
        .mount(&server)
        .await;

    let mut document = base_document(format!("{}/scenes", server.uri()));
    document["secondary_detail"] = json!({
        "selector": "section.downloads",
        "script": "files.rhai",
        "directives": [
            { "var_name": "names", "method": "child_texts", "args": ["span.name"] }
        ]
    });

    let (outcome, records) = scrape(definition(document), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, generate_id("Example VR", "1"));
    assert_eq!(records[1].id, generate_id("Example VR", "2"));
    for record in &records {
        assert_eq!(record.filenames, vec!["pack.zip"]);
    }
    assert_eq!(report.records_emitted, 2);
    assert_eq!(report.duplicates, 0);
    assert!(report.dropped_records.is_empty());
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_failed_secondary_page_drops_record() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(scene_page("5", "Five", &[])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/5"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut document = base_document(format!("{}/scene/5", server.uri()));
    document["secondary_detail"] = json!({
        "selector": "section.downloads",
        "script": "files.rhai",
        "directives": [
            { "var_name": "names", "method": "child_texts", "args": ["span.name"] }
        ]
    });

    let (outcome, records) = scrape(definition(document), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert!(records.is_empty());
    assert_eq!(report.dropped_records, vec![generate_id("Example VR", "5")]);
    assert_eq!(report.failures.len(), 1);
    assert!(!report.is_clean());
}

/// Answers 429 and counts arrivals that found a cache entry for the URL
struct RateLimitedChecksCache {
    cache: ResponseCache,
    url: String,
    violations: Arc<AtomicUsize>,
}

impl Respond for RateLimitedChecksCache {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.cache.contains(&self.url) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        ResponseTemplate::new(429)
    }
}

#[tokio::test]
async fn test_rate_limit_exhaustion_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let start = format!("{}/scene/9", server.uri());
    let cache = ResponseCache::new(settings(&dir).cache_dir);
    let violations = Arc::new(AtomicUsize::new(0));

    // One initial attempt plus the default 15 retries
    Mock::given(method("GET"))
        .and(path("/scene/9"))
        .respond_with(RateLimitedChecksCache {
            cache: cache.clone(),
            url: start.clone(),
            violations: violations.clone(),
        })
        .expect(16)
        .mount(&server)
        .await;

    let (outcome, records) =
        scrape(definition(base_document(start.clone())), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert!(records.is_empty());
    assert_eq!(report.rate_limit_exhausted, vec![start.clone()]);
    assert_eq!(report.retries, 15);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(!cache.contains(&start));
}

/// Rate-limits the first `limit` arrivals, then serves a scene
struct RateLimitedThenOk {
    limit: usize,
    seen: AtomicUsize,
    body: String,
}

impl Respond for RateLimitedThenOk {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.limit {
            ResponseTemplate::new(429)
        } else {
            ResponseTemplate::new(200).set_body_string(self.body.clone())
        }
    }
}

#[tokio::test]
async fn test_rate_limited_page_recovers() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/7"))
        .respond_with(RateLimitedThenOk {
            limit: 3,
            seen: AtomicUsize::new(0),
            body: scene_page("7", "Seven", &[]),
        })
        .expect(4)
        .mount(&server)
        .await;

    let start = format!("{}/scene/7", server.uri());
    let (outcome, records) =
        scrape(definition(base_document(start)), &dir, RunOptions::default()).await;
    let report = outcome.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Seven");
    assert_eq!(report.retries, 3);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(scene_page("3", "Three", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let start = format!("{}/scene/3", server.uri());

    let (first, _) =
        scrape(definition(base_document(start.clone())), &dir, RunOptions::default()).await;
    assert_eq!(first.unwrap().pages_fetched, 1);

    let (second, records) =
        scrape(definition(base_document(start)), &dir, RunOptions::default()).await;
    let report = second.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.pages_fetched, 0);
}

#[tokio::test]
async fn test_script_failure_aborts_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(scene_page("4", "Four", &[])))
        .mount(&server)
        .await;

    let definition = definition(base_document(format!("{}/scene/4", server.uri())));
    let engine = ScriptEngine::new();
    let detail = engine
        .compile_source("broken", r#"let title = raw_title; throw "bad page";"#)
        .unwrap();
    let scripts = StageScripts {
        detail,
        secondary: None,
    };
    let dispatcher =
        Dispatcher::new(definition, scripts, settings(&dir), RunOptions::default()).unwrap();

    let (handle, mut rx) = spawn_scrape(dispatcher, 4);
    assert!(rx.recv().await.is_none());

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(ScrapeError::Script(_))));
}

#[tokio::test]
async fn test_cancelled_run_reports_cancellation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/scene/8"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let options = RunOptions::default();
    let cancel = options.cancel.clone();
    let definition = definition(base_document(format!("{}/scene/8", server.uri())));

    let engine = ScriptEngine::new();
    let detail_path = write_scripts(dir.path());
    let scripts = StageScripts::load(&engine, &definition, &detail_path).unwrap();
    let settings = CrawlerSettings {
        retry_delay_ms: 60_000,
        ..settings(&dir)
    };
    let dispatcher = Dispatcher::new(definition, scripts, settings, options).unwrap();

    let (handle, mut rx) = spawn_scrape(dispatcher, 4);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    assert!(rx.recv().await.is_none());
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(ScrapeError::Cancelled)));
}
