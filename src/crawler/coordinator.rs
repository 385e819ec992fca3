//! Crawl orchestrator - main crawl state machine
//!
//! The orchestrator is the only owner of [`CrawlState`]. It moves work between
//! the [`WorkQueue`] and the [`WorkerPool`], turns fetched pages into listings,
//! decides when the list pages end and persists the checkpoint. Workers only
//! fetch and report back through the pool.
//!
//! Phases: `Discovering -> Listing -> Detailing -> Draining -> Done`. A shutdown
//! signal moves any running phase straight to `Draining`.

use crate::config::Config;
use crate::crawler::parser::{CatalogExtractor, ExtractionError, Extractor, ListPage};
use crate::crawler::pool::{PoolEvent, WorkerPool};
use crate::crawler::queue::WorkQueue;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::shutdown::{wait_for_shutdown, ShutdownCoordinator};
use crate::crawler::{ErrorClass, Fetch, FetchError, HttpFetcher};
use crate::output::{FailedReport, FlushReport, OutputResult, ResultSink, SqliteSink};
use crate::state::{CrawlPhase, CrawlState, Listing, WorkItem, WorkKind};
use crate::storage::CheckpointStore;
use crate::url::page_url;
use crate::{ConfigError, HarvestError, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use url::Url;

/// Completed items between progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub phase: CrawlPhase,

    /// True if the run stopped because of a shutdown signal
    pub interrupted: bool,

    /// Items fetched or abandoned during this run
    pub completed: u64,

    pub listings: usize,
    pub failed: usize,

    /// Items left for the next run
    pub pending: usize,

    pub peak_in_flight: usize,

    /// Where the final checkpoint went, if it could be written at all
    pub checkpoint: Option<PathBuf>,

    pub flush: FlushReport,
    pub elapsed: Duration,
}

/// Chain state while the last list page is unknown
#[derive(Debug, Default)]
struct Probe {
    /// Card URLs of the most recently extracted list page
    previous: Option<(u32, BTreeSet<String>)>,
}

/// What woke the main loop
enum Step {
    Shutdown,
    Event(Option<PoolEvent>),
}

/// Main crawler orchestrator structure
pub struct CrawlOrchestrator {
    config: Config,
    phase: CrawlPhase,
    state: CrawlState,
    queue: WorkQueue,
    pool: WorkerPool,
    extractor: Box<dyn Extractor>,
    checkpoint: CheckpointStore,
    sink: Box<dyn ResultSink + Send>,
    failed_report: FailedReport,
    shutdown: watch::Receiver<bool>,

    /// Normalized URL of the first list page
    start_url: String,

    /// True until the start page has been extracted
    awaiting_start: bool,

    probe: Option<Probe>,
    interrupted: bool,
    completed: u64,
    since_save: u32,
    started: Instant,
}

impl CrawlOrchestrator {
    /// Creates an orchestrator and loads the checkpoint if resuming
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, recorded in the checkpoint
    /// * `fetcher` - Performs the HTTP requests
    /// * `shutdown` - Receiver that flips to `true` when the run must stop
    pub fn new(
        config: Config,
        config_hash: Option<String>,
        fetcher: Arc<dyn Fetch>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let extractor = CatalogExtractor::new(&config.selectors).map_err(|e| match e {
            ExtractionError::InvalidSelector { field, selector } => {
                HarvestError::Config(ConfigError::InvalidSelector {
                    field: field.to_string(),
                    selector,
                })
            }
            other => HarvestError::Config(ConfigError::Validation(other.to_string())),
        })?;

        let crawler = &config.crawler;
        let start_url = page_url(&crawler.category_url, crawler.start_page)?.to_string();
        let checkpoint = CheckpointStore::new(&config.output.checkpoint_path);

        let mut state = if crawler.resume {
            checkpoint.load(&crawler.category_url)
        } else {
            tracing::info!("Starting fresh, ignoring any existing checkpoint");
            CrawlState::new(crawler.category_url.clone())
        };

        if let (Some(previous), Some(current)) = (&state.config_hash, &config_hash) {
            if previous != current {
                tracing::info!(
                    previous = %previous,
                    current = %current,
                    "Configuration changed since the checkpoint was written"
                );
            }
        }
        if config_hash.is_some() {
            state.config_hash = config_hash;
        }

        let pool = WorkerPool::new(
            fetcher,
            RetryPolicy::from_config(crawler),
            crawler.max_concurrent as usize,
        );
        let sink = SqliteSink::new(&config.output.database_path, &config.output.fallback_path);
        let failed_report = FailedReport::new(&config.output.failed_urls_path);

        Ok(Self {
            config,
            phase: CrawlPhase::Discovering,
            state,
            queue: WorkQueue::new(),
            pool,
            extractor: Box::new(extractor),
            checkpoint,
            sink: Box::new(sink),
            failed_report,
            shutdown,
            start_url,
            awaiting_start: false,
            probe: None,
            interrupted: false,
            completed: 0,
            since_save: 0,
            started: Instant::now(),
        })
    }

    /// Current checkpoint contents
    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Runs the crawl to completion or until shutdown
    ///
    /// The checkpoint is persisted and the listings flushed before returning,
    /// also when the run was interrupted.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished or drained cleanly
    /// * `Err(HarvestError::FatalDiscovery)` - The start page could not be fetched
    /// * `Err(HarvestError::Flush)` - Listings could not be written anywhere
    pub async fn run(mut self) -> Result<RunSummary> {
        self.start()?;

        loop {
            if self.phase.accepts_work() {
                if *self.shutdown.borrow() {
                    self.begin_drain();
                } else {
                    self.fill_slots();
                }
            }

            let finished = if self.phase == CrawlPhase::Draining {
                self.pool.in_flight() == 0
            } else {
                self.queue.is_empty() && self.pool.is_idle()
            };
            if finished {
                break;
            }

            let accepting = self.phase.accepts_work();
            let step = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown), if accepting => Step::Shutdown,
                event = self.pool.next_event() => Step::Event(event),
            };

            match step {
                Step::Shutdown => self.begin_drain(),
                Step::Event(Some(event)) => self.handle_event(event).await?,
                Step::Event(None) => {
                    if self.queue.is_empty() {
                        break;
                    }
                }
            }
        }

        self.finish().await
    }

    /// Seeds the queue from the checkpoint and plans the first work
    fn start(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.state.pending);
        let restored = pending.len();
        for item in pending {
            self.queue.enqueue(item, &self.state.processed);
        }

        tracing::info!(
            category = %self.config.crawler.category_url,
            processed = self.state.processed.len(),
            listings = self.state.listings.len(),
            pending = restored,
            "Starting crawl"
        );

        if self.state.is_processed(&self.start_url) {
            tracing::info!(url = %self.start_url, "Start page already processed, skipping discovery");
            self.transition(CrawlPhase::Listing);
            self.plan_pages(None, None)?;
            self.advance_phase();
        } else {
            self.awaiting_start = true;
            let start = WorkItem::list_page(self.start_url.clone(), self.config.crawler.start_page);
            self.enqueue(start);
        }

        Ok(())
    }

    /// Hands queued work to the pool while slots are free
    ///
    /// Ready retries go first, then the queue (list pages before details).
    fn fill_slots(&mut self) {
        while self.pool.has_capacity() {
            let Some(item) = self.pool.pop_ready_retry().or_else(|| self.queue.pop()) else {
                break;
            };
            if self.state.is_processed(&item.url) {
                continue;
            }
            self.pool.dispatch(item);
        }
    }

    /// Adds work unless it is processed, queued or held by the pool
    fn enqueue(&mut self, item: WorkItem) -> bool {
        if self.pool.is_tracking(&item.url) {
            return false;
        }
        self.queue.enqueue(item, &self.state.processed)
    }

    async fn handle_event(&mut self, event: PoolEvent) -> Result<()> {
        match event {
            PoolEvent::Fetched { item, body } => {
                self.on_fetched(item, &body).await?;
                self.complete_item().await;
            }
            PoolEvent::Abandoned { item, error } => {
                self.on_abandoned(item, error).await?;
                self.complete_item().await;
            }
            PoolEvent::Rescheduled { url, attempt, delay } => {
                tracing::trace!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");
            }
            PoolEvent::RetryReady => {}
        }

        if self.phase == CrawlPhase::Draining {
            self.requeue_backoff();
        }
        self.advance_phase();
        Ok(())
    }

    async fn on_fetched(&mut self, item: WorkItem, body: &str) -> Result<()> {
        let page_url = match Url::parse(&item.url) {
            Ok(url) => url,
            Err(e) => return self.on_extraction_failed(item, e.to_string()).await,
        };

        match item.kind.clone() {
            WorkKind::ListPage { page } => match self.extractor.extract_list(body, &page_url) {
                Ok(list) => self.on_list_page(&item, page, list),
                Err(e) => self.on_extraction_failed(item, e.to_string()).await,
            },
            WorkKind::DetailPage { card } => match self.extractor.extract_detail(body, &page_url) {
                Ok(detail) => {
                    let mut fields = card;
                    fields.merge_from(&detail);
                    self.state.upsert_listing(Listing::new(item.url.clone(), fields));
                    tracing::debug!(url = %item.url, "Listing extracted");
                    Ok(())
                }
                Err(e) => self.on_extraction_failed(item, e.to_string()).await,
            },
        }
    }

    fn on_list_page(&mut self, item: &WorkItem, page: u32, list: ListPage) -> Result<()> {
        self.state.mark_processed(&item.url);

        let card_urls: BTreeSet<String> = list.cards.iter().map(|c| c.url.clone()).collect();
        let found = list.cards.len();
        let mut queued = 0;

        for card in list.cards {
            if self.config.crawler.fetch_details {
                if self.enqueue(WorkItem::detail_page(card.url, card.fields)) {
                    queued += 1;
                }
            } else {
                self.state.upsert_listing(Listing::new(card.url, card.fields));
            }
        }

        tracing::info!(
            url = %item.url,
            page,
            cards = found,
            queued,
            hint = ?list.last_page_hint,
            "List page extracted"
        );

        if self.awaiting_start && item.url == self.start_url {
            self.awaiting_start = false;
            self.transition(CrawlPhase::Listing);
            self.plan_pages(list.last_page_hint, Some(card_urls))
        } else {
            self.advance_probe(page, Some(card_urls))
        }
    }

    async fn on_abandoned(&mut self, item: WorkItem, error: FetchError) -> Result<()> {
        let failure = match error.class() {
            ErrorClass::Transient => HarvestError::TransientNetwork {
                url: item.url.clone(),
                attempt: item.attempt,
                message: error.to_string(),
            },
            ErrorClass::Permanent => HarvestError::PermanentRequest {
                url: item.url.clone(),
                message: error.to_string(),
            },
        };
        tracing::debug!(error = %failure, "Recording failed item");

        self.state
            .record_failure(&item.url, error.to_string(), item.attempt);

        if self.awaiting_start && item.url == self.start_url {
            return self.fail_discovery(item.url, error.to_string()).await;
        }

        match item.page() {
            Some(page) => self.advance_probe(page, None),
            None => Ok(()),
        }
    }

    /// Records a page that was fetched but could not be extracted; never retried
    async fn on_extraction_failed(&mut self, item: WorkItem, message: String) -> Result<()> {
        let error = HarvestError::Extraction {
            url: item.url.clone(),
            message: message.clone(),
        };
        tracing::warn!(
            url = %item.url,
            attempt = item.attempt + 1,
            class = "extraction",
            error = %error,
            "Extraction failed"
        );
        self.state
            .record_failure(&item.url, format!("extraction failed: {}", message), item.attempt + 1);

        if self.awaiting_start && item.url == self.start_url {
            return self.fail_discovery(item.url, message).await;
        }

        match item.page() {
            Some(page) => self.advance_probe(page, None),
            None => Ok(()),
        }
    }

    /// Persists what we have and aborts the run
    async fn fail_discovery(&mut self, url: String, reason: String) -> Result<()> {
        tracing::error!(url = %url, reason = %reason, "Start page unreachable, aborting");
        self.transition(CrawlPhase::Draining);
        self.requeue_backoff();
        self.save_final().await;
        if let Err(e) = self.flush_listings() {
            tracing::error!(error = %e, "Listings could not be written before aborting");
        }
        Err(HarvestError::FatalDiscovery { url, reason })
    }

    /// Decides how far the list pages go
    ///
    /// The bound is `end_page`, else the start page's pagination hint, else the
    /// bound recorded in the checkpoint. Without one the pages are probed one at
    /// a time.
    fn plan_pages(&mut self, hint: Option<u32>, start_cards: Option<BTreeSet<String>>) -> Result<()> {
        let crawler = &self.config.crawler;
        let start = crawler.start_page;
        let hint = hint.filter(|h| *h >= start);

        let bound = match (crawler.end_page, hint, self.state.last_page) {
            (Some(end), _, _) => Some((end, "end-page")),
            (None, Some(hint), _) => Some((hint, "pagination")),
            (None, None, Some(last)) => Some((last, "checkpoint")),
            (None, None, None) => None,
        };

        let Some((last, source)) = bound else {
            tracing::info!(
                max_pages = crawler.max_pages,
                "No page bound known, probing list pages one by one"
            );
            self.probe = Some(Probe::default());
            return match start_cards {
                Some(cards) => self.advance_probe(start, Some(cards)),
                None => self.resume_probe(),
            };
        };

        if source == "pagination" {
            self.state.last_page = Some(last);
        }

        let category = crawler.category_url.clone();
        let mut queued = 0;
        for page in start..=last {
            let url = page_url(&category, page)?;
            if self.enqueue(WorkItem::list_page(url.to_string(), page)) {
                queued += 1;
            }
        }

        tracing::info!(last_page = last, source, queued, "Page bound resolved");
        Ok(())
    }

    /// Restarts the page chain after a resume that left no list page pending
    fn resume_probe(&mut self) -> Result<()> {
        if self.queue.list_len() > 0 {
            return Ok(());
        }

        let crawler = &self.config.crawler;
        let mut page = crawler.start_page;
        while page < crawler.max_pages
            && self
                .state
                .is_processed(page_url(&crawler.category_url, page + 1)?.as_str())
        {
            page += 1;
        }

        self.advance_probe(page, None)
    }

    /// Extends the page chain after list page `page` completed
    ///
    /// `cards` is `None` when the page failed; a failed page keeps the chain going.
    fn advance_probe(&mut self, page: u32, cards: Option<BTreeSet<String>>) -> Result<()> {
        let Some(probe) = self.probe.as_mut() else {
            return Ok(());
        };

        let stop = match &cards {
            Some(c) if c.is_empty() => Some((page.saturating_sub(1), "empty page")),
            Some(c) if matches!(&probe.previous, Some((p, prev)) if *p + 1 == page && prev == c) => {
                Some((page - 1, "repeated page"))
            }
            _ if page >= self.config.crawler.max_pages => Some((page, "page cap")),
            _ => None,
        };

        if let Some((last, reason)) = stop {
            self.probe = None;
            self.state.last_page = Some(last);
            tracing::info!(last_page = last, reason, "Last list page found");
            return Ok(());
        }

        probe.previous = cards.map(|c| (page, c));

        let next = page + 1;
        let url = page_url(&self.config.crawler.category_url, next)?;
        self.enqueue(WorkItem::list_page(url.to_string(), next));
        Ok(())
    }

    /// True while list pages are queued, in flight, backing off or still being probed
    fn list_work_outstanding(&self) -> bool {
        self.awaiting_start
            || self.queue.list_len() > 0
            || self.pool.pending_items().any(WorkItem::is_list_page)
    }

    fn advance_phase(&mut self) {
        if self.phase == CrawlPhase::Listing && !self.list_work_outstanding() {
            self.transition(CrawlPhase::Detailing);
        }
    }

    fn transition(&mut self, next: CrawlPhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            tracing::debug!(from = %self.phase, to = %next, "Ignoring phase change");
            return;
        }
        tracing::info!(from = %self.phase, to = %next, "Phase change");
        self.phase = next;
    }

    /// Stops taking work; in-flight fetches are allowed to finish
    fn begin_drain(&mut self) {
        if !self.phase.accepts_work() {
            return;
        }
        self.interrupted = true;
        tracing::info!(
            in_flight = self.pool.in_flight(),
            "Shutdown requested, waiting for in-flight fetches"
        );
        self.transition(CrawlPhase::Draining);
        self.requeue_backoff();
    }

    /// Moves items waiting on a backoff timer back to the queue
    fn requeue_backoff(&mut self) {
        for item in self.pool.take_backoff() {
            self.queue.enqueue(item, &self.state.processed);
        }
    }

    async fn complete_item(&mut self) {
        self.completed += 1;
        self.since_save += 1;

        if self.completed % PROGRESS_INTERVAL == 0 {
            self.log_progress();
        }

        if self.since_save >= self.config.crawler.auto_save_interval {
            self.since_save = 0;
            self.save().await;
        }
    }

    fn log_progress(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.completed as f64 / elapsed
        } else {
            0.0
        };
        tracing::info!(
            phase = %self.phase,
            completed = self.completed,
            listings = self.state.listings.len(),
            failed = self.state.failed.len(),
            queued = self.queue.len(),
            in_flight = self.pool.in_flight(),
            "Progress: {:.1} items/sec",
            rate
        );
    }

    /// Copies outstanding work into `state.pending`
    fn snapshot_pending(&mut self) {
        let processed = &self.state.processed;
        let mut seen = HashSet::new();
        let pending: Vec<WorkItem> = self
            .pool
            .pending_items()
            .chain(self.queue.items())
            .filter(|item| !processed.contains(&item.url) && seen.insert(item.url.clone()))
            .cloned()
            .collect();
        self.state.pending = pending;
    }

    /// Periodic persist and output flush
    ///
    /// Failures are logged and the run continues in memory; the next interval
    /// tries again.
    async fn save(&mut self) {
        self.report_failures();
        self.snapshot_pending();
        match self.checkpoint.persist(&mut self.state).await {
            Ok(()) => tracing::debug!(
                path = %self.checkpoint.path().display(),
                processed = self.state.processed.len(),
                pending = self.state.pending.len(),
                "Checkpoint saved"
            ),
            Err(e) => tracing::warn!(
                path = %self.checkpoint.path().display(),
                error = %HarvestError::CheckpointIo(e),
                "Checkpoint write failed, continuing in memory"
            ),
        }

        if let Err(e) = self.flush_listings() {
            tracing::warn!(error = %e, "Periodic listing flush failed, continuing");
        }
    }

    /// Reports new failures and writes the final checkpoint
    async fn save_final(&mut self) -> Option<PathBuf> {
        self.report_failures();

        self.snapshot_pending();
        match self.checkpoint.persist_final(&mut self.state).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Final checkpoint saved");
                Some(path)
            }
            Err(e) => {
                tracing::error!(error = %HarvestError::CheckpointIo(e), "Final checkpoint could not be saved");
                None
            }
        }
    }

    /// Appends failures not yet in the failed URL report
    fn report_failures(&mut self) {
        let unreported = self.state.unreported_failures().to_vec();
        match self.failed_report.append(&unreported) {
            Ok(_) => self.state.mark_failures_reported(),
            Err(e) => tracing::warn!(error = %e, "Could not append to the failed URL report"),
        }
    }

    /// Writes every listing gathered so far through the sink
    fn flush_listings(&mut self) -> OutputResult<FlushReport> {
        let listings: Vec<&Listing> = self.state.listings.values().collect();
        self.sink.flush(&listings)
    }

    async fn finish(mut self) -> Result<RunSummary> {
        self.requeue_backoff();
        self.transition(CrawlPhase::Draining);

        let checkpoint = self.save_final().await;

        let flush = self.flush_listings()?;

        self.transition(CrawlPhase::Done);

        let summary = RunSummary {
            phase: self.phase,
            interrupted: self.interrupted,
            completed: self.completed,
            listings: self.state.listings.len(),
            failed: self.state.failed.len(),
            pending: self.state.pending.len(),
            peak_in_flight: self.pool.peak_in_flight(),
            checkpoint,
            flush,
            elapsed: self.started.elapsed(),
        };

        tracing::info!(
            interrupted = summary.interrupted,
            completed = summary.completed,
            listings = summary.listings,
            failed = summary.failed,
            pending = summary.pending,
            written = summary.flush.written,
            elapsed_secs = summary.elapsed.as_secs(),
            "Crawl finished"
        );

        Ok(summary)
    }
}

/// Runs a complete crawl with the HTTP fetcher and OS signal handling
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the HTTP client
/// 2. Install the Ctrl-C / SIGTERM listener
/// 3. Load the checkpoint (unless `resume` is off)
/// 4. Crawl until done or interrupted
/// 5. Persist the checkpoint and flush the listings
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::load_config_with_hash;
/// use catalog_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_crawl(config, Some(hash)).await?;
/// println!("{} listings", summary.listings);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: Option<String>) -> Result<RunSummary> {
    let fetcher = HttpFetcher::from_config(&config.crawler, &config.user_agent)?;

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.listen_for_signals();

    let orchestrator =
        CrawlOrchestrator::new(config, config_hash, Arc::new(fetcher), shutdown.subscribe())?;
    let result = orchestrator.run().await;

    listener.abort();
    result
}
