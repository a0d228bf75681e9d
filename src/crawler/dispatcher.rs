//! Stage dispatcher - main crawl orchestration logic
//!
//! The dispatcher owns one fetcher per stage and drives the crawl state
//! machine:
//!
//! ```text
//! Listing -> Pagination (loop) -> Detail -> [SecondaryDetail] -> emitted
//! ```
//!
//! Fetches run concurrently as tasks. Fetched pages are handled one at a
//! time on the dispatcher's own loop, so script executions never overlap.

use crate::config::{CrawlerSettings, LinkStage, ScraperDefinition};
use crate::crawler::extract::{
    build_context, compile_directives, parse_selector, select_attr_values, CompiledDirective,
};
use crate::crawler::fetcher::{build_http_client, Fetched, Fetcher, Response};
use crate::crawler::report::{CrawlReport, SkipReason};
use crate::record::{assemble_record, OutputRecord};
use crate::script::{CompiledScript, StageScripts};
use crate::state::{RequestContext, Stage};
use crate::url::{find_skip_match, resolve_url, AllowedDomains};
use crate::{ConfigError, ScrapeError};
use reqwest::Method;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Caller-side knobs for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// URLs skipped by stages with `skip_known` set
    pub known_urls: HashSet<String>,

    /// Cancels retry waits, in-flight requests and emission
    pub cancel: CancellationToken,
}

/// What a page handler asks the dispatcher to do
#[derive(Debug)]
pub enum Action {
    Visit {
        stage: Stage,
        url: Url,
        ctx: RequestContext,
    },
    Emit(OutputRecord),
    Skip {
        url: String,
        reason: SkipReason,
    },
}

/// A link stage with its selector parsed
struct LinkRule {
    selector: Selector,
    visit_attr: String,
    skip_url_contains: Vec<String>,
    skip_known: bool,
}

impl LinkRule {
    fn compile(stage: &LinkStage) -> Result<Self, ConfigError> {
        Ok(Self {
            selector: parse_selector(&stage.selector)?,
            visit_attr: stage.visit_attr.clone(),
            skip_url_contains: stage.skip_url_contains.clone(),
            skip_known: stage.skip_known,
        })
    }
}

/// A script-running stage with its selector and directives parsed
struct ContentRule {
    selector: Selector,
    directives: Vec<CompiledDirective>,
    script: CompiledScript,
}

struct Fetchers {
    index: Fetcher,
    detail: Fetcher,
    secondary: Fetcher,
}

impl Fetchers {
    fn for_stage(&self, stage: Stage) -> &Fetcher {
        match stage {
            Stage::Listing | Stage::Pagination => &self.index,
            Stage::Detail => &self.detail,
            Stage::SecondaryDetail => &self.secondary,
        }
    }
}

type Visited = (Stage, Url, Option<Fetched>);

/// Main crawl orchestration structure
pub struct Dispatcher {
    definition: Arc<ScraperDefinition>,
    settings: CrawlerSettings,
    listing: Option<LinkRule>,
    pagination: Option<LinkRule>,
    detail: ContentRule,
    secondary: Option<ContentRule>,
    options: RunOptions,
}

impl Dispatcher {
    /// Builds the dispatch table for a definition
    ///
    /// # Arguments
    ///
    /// * `definition` - A validated scraper definition
    /// * `scripts` - The compiled detail (and secondary) scripts
    /// * `settings` - Runtime settings
    /// * `options` - Known URLs and the cancellation token
    pub fn new(
        definition: ScraperDefinition,
        scripts: StageScripts,
        settings: CrawlerSettings,
        options: RunOptions,
    ) -> Result<Self, ScrapeError> {
        crate::config::validate_settings(&settings)?;

        let listing = definition.listing().map(LinkRule::compile).transpose()?;
        let pagination = definition.pagination().map(LinkRule::compile).transpose()?;

        let detail = ContentRule {
            selector: parse_selector(&definition.detail.selector)?,
            directives: compile_directives(&definition.detail.directives)?,
            script: scripts.detail,
        };

        let secondary = match (definition.secondary_detail(), scripts.secondary) {
            (Some(stage), Some(script)) => Some(ContentRule {
                selector: parse_selector(&stage.selector)?,
                directives: compile_directives(&stage.directives)?,
                script,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Validation(
                    "secondary_detail stage has no compiled script".to_string(),
                )
                .into());
            }
            (None, _) => None,
        };

        Ok(Self {
            definition: Arc::new(definition),
            settings,
            listing,
            pagination,
            detail,
            secondary,
            options,
        })
    }

    /// The stage the start URL is visited at
    pub fn entry_stage(&self) -> Stage {
        if self.listing.is_some() {
            Stage::Listing
        } else {
            Stage::Detail
        }
    }

    /// Runs the crawl until the site graph is exhausted
    ///
    /// Records are sent on `output` as they are finished; the receiver must
    /// keep draining it. Script failures abort the run, failed requests are
    /// collected in the returned report.
    pub async fn run(self, output: mpsc::Sender<OutputRecord>) -> Result<CrawlReport, ScrapeError> {
        let started = Instant::now();
        let cancel = self.options.cancel.clone();

        let client = build_http_client(&self.settings)?;
        let allowed = AllowedDomains::new(&self.definition.allowed_domains);
        let index = Fetcher::new(
            Stage::Listing,
            client,
            allowed,
            &self.settings,
            cancel.clone(),
        );
        let fetchers = Fetchers {
            detail: index.clone_scoped(Stage::Detail),
            secondary: index.clone_scoped(Stage::SecondaryDetail),
            index,
        };

        let start = Url::parse(&self.definition.start_url)?;
        let entry = self.entry_stage();
        tracing::info!(
            "Starting {} at {} ({} stage)",
            self.definition.scraper_id,
            start,
            entry
        );

        let mut report = CrawlReport::default();
        let mut tasks: JoinSet<Visited> = JoinSet::new();
        spawn_visit(&mut tasks, &fetchers, entry, start, RequestContext::new());

        while let Some(joined) = tasks.join_next().await {
            let (stage, url, fetched) = joined.map_err(|e| ScrapeError::TaskFailed(e.to_string()))?;

            let Some(Fetched { ctx, result, .. }) = fetched else {
                report.duplicates += 1;
                continue;
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    if let Some(record) = ctx.record() {
                        tracing::warn!(
                            "Dropping record {} after its {} page failed",
                            record.id,
                            stage
                        );
                        report.dropped_records.push(record.id.clone());
                    }
                    report.record_failure(e);
                    continue;
                }
            };

            report.pages_processed += 1;
            let actions = match self.handle_page(stage, &response, ctx) {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::error!("Aborting run on {}: {}", url, e);
                    tasks.abort_all();
                    return Err(e);
                }
            };

            if actions.is_empty() {
                report.unmatched_pages.push(response.final_url.to_string());
            }

            for action in actions {
                match action {
                    Action::Visit {
                        stage: next,
                        url,
                        ctx,
                    } => {
                        debug_assert!(stage.can_hand_off_to(next));
                        spawn_visit(&mut tasks, &fetchers, next, url, ctx);
                    }
                    Action::Emit(record) => {
                        if let Err(e) = emit(&output, record, &cancel).await {
                            tasks.abort_all();
                            return Err(e);
                        }
                        report.records_emitted += 1;
                    }
                    Action::Skip { url, reason } => report.skip(url, reason),
                }
            }

            if report.pages_processed % 10 == 0 {
                tracing::info!(
                    "Progress: {} pages processed, {} records, {} requests pending",
                    report.pages_processed,
                    report.records_emitted,
                    tasks.len()
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        let stats = fetchers.index.stats();
        report.pages_fetched = stats.pages_fetched;
        report.cache_hits = stats.cache_hits;
        report.retries = stats.retries;
        report.elapsed = started.elapsed();

        for url in &report.rate_limit_exhausted {
            tracing::warn!("No record produced for rate-limited {}", url);
        }

        tracing::info!(
            "Crawl completed: {} records from {} pages in {:?}",
            report.records_emitted,
            report.pages_processed,
            report.elapsed
        );

        Ok(report)
    }

    /// The dispatch table: routes a fetched page to its stage handler
    pub fn handle_page(
        &self,
        stage: Stage,
        response: &Response,
        ctx: RequestContext,
    ) -> Result<Vec<Action>, ScrapeError> {
        let document = Html::parse_document(&response.body);
        let page_url = &response.final_url;

        match stage {
            Stage::Listing | Stage::Pagination => Ok(self.handle_index_page(&document, page_url)),
            Stage::Detail => self.handle_detail_page(&document, page_url),
            Stage::SecondaryDetail => self.handle_secondary_page(&document, page_url, ctx),
        }
    }

    fn handle_index_page(&self, document: &Html, page_url: &Url) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(rule) = &self.listing {
            for href in select_attr_values(document, &rule.selector, &rule.visit_attr) {
                actions.push(self.follow(rule, Stage::Detail, &href, page_url));
            }
        }

        if let Some(rule) = &self.pagination {
            for href in select_attr_values(document, &rule.selector, &rule.visit_attr) {
                actions.push(self.follow(rule, Stage::Pagination, &href, page_url));
            }
        }

        actions
    }

    /// Turns a link-stage attribute value into a visit or a skip
    fn follow(&self, rule: &LinkRule, stage: Stage, href: &str, page_url: &Url) -> Action {
        let Some(url) = resolve_url(href, page_url) else {
            return Action::Skip {
                url: href.to_string(),
                reason: SkipReason::Unresolvable,
            };
        };

        if let Some(substring) = find_skip_match(url.as_str(), &rule.skip_url_contains) {
            return Action::Skip {
                url: url.to_string(),
                reason: SkipReason::SkipRule(substring.to_string()),
            };
        }

        if rule.skip_known && self.options.known_urls.contains(url.as_str()) {
            return Action::Skip {
                url: url.to_string(),
                reason: SkipReason::Known,
            };
        }

        Action::Visit {
            stage,
            url,
            ctx: RequestContext::new(),
        }
    }

    fn handle_detail_page(
        &self,
        document: &Html,
        page_url: &Url,
    ) -> Result<Vec<Action>, ScrapeError> {
        let mut actions = Vec::new();

        for fragment in document.select(&self.detail.selector) {
            let output = run_script(&self.detail, fragment, page_url)?;
            let record = assemble_record(&self.definition, &output);

            if self.secondary.is_none() {
                actions.push(Action::Emit(record));
                continue;
            }

            match resolve_url(&output.extra_url, page_url) {
                Some(extra_url) => actions.push(Action::Visit {
                    stage: Stage::SecondaryDetail,
                    url: extra_url,
                    ctx: RequestContext::with_record(record),
                }),
                None => {
                    tracing::warn!(
                        "No usable extra_url for {} on {}, emitting without secondary data",
                        record.id,
                        page_url
                    );
                    actions.push(Action::Emit(record));
                }
            }
        }

        Ok(actions)
    }

    fn handle_secondary_page(
        &self,
        document: &Html,
        page_url: &Url,
        mut ctx: RequestContext,
    ) -> Result<Vec<Action>, ScrapeError> {
        let Some(rule) = &self.secondary else {
            return Ok(Vec::new());
        };

        let Some(carried) = ctx.take_record() else {
            tracing::warn!("Secondary page {} arrived without a record", page_url);
            return Ok(Vec::new());
        };

        let mut actions = Vec::new();
        for fragment in document.select(&rule.selector) {
            let output = run_script(rule, fragment, page_url)?;
            let extra = assemble_record(&self.definition, &output);

            let mut record = carried.clone();
            record.fill_missing(&extra);
            actions.push(Action::Emit(record));
        }

        if actions.is_empty() {
            tracing::warn!(
                "Secondary selector matched nothing on {}, emitting {} as-is",
                page_url,
                carried.id
            );
            actions.push(Action::Emit(carried));
        }

        Ok(actions)
    }
}

fn run_script(
    rule: &ContentRule,
    fragment: ElementRef<'_>,
    page_url: &Url,
) -> Result<crate::script::ScriptOutput, ScrapeError> {
    let ctx = build_context(fragment, &rule.directives, page_url);
    Ok(rule.script.run(&ctx)?)
}

fn spawn_visit(
    tasks: &mut JoinSet<Visited>,
    fetchers: &Fetchers,
    stage: Stage,
    url: Url,
    ctx: RequestContext,
) {
    let fetcher = fetchers.for_stage(stage).clone();
    tasks.spawn(async move {
        // A carried record needs its own response even when its URL repeats
        let fetched = if ctx.record().is_some() {
            Some(fetcher.request(Method::GET, url.clone(), ctx).await)
        } else {
            fetcher.visit(url.clone(), ctx).await
        };
        (stage, url, fetched)
    });
}

/// Sends a record downstream, waiting while the channel is full
async fn emit(
    output: &mpsc::Sender<OutputRecord>,
    record: OutputRecord,
    cancel: &CancellationToken,
) -> Result<(), ScrapeError> {
    tracing::info!("Emitting record {} ({})", record.id, record.title);

    tokio::select! {
        _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
        sent = output.send(record) => sent.map_err(|_| ScrapeError::OutputClosed),
    }
}
