//! One monitoring cycle: crawl, reconcile, execute, persist.
//!
//! The cycle owns the [`Ledgers`] for its duration and holds the state lock.
//! Ledgers are saved after the crawl has been reconciled and again after
//! every document write, so an interrupted cycle loses at most the document
//! in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::classify::StorageLayout;
use crate::config::{Config, HumanBehavior};
use crate::download::{
    DownloadError, DownloadExecutor, ExecuteOutcome, Fetcher, RetryPolicy, build_fetcher,
};
use crate::ledger::{LedgerError, LedgerStore, Ledgers};
use crate::reconcile::{ActionPlan, Reconciler, RunMode};
use crate::schedule;

/// Fatal cycle errors. Per-document failures are counted, not returned.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("cannot create fetcher: {0}")]
    Fetcher(#[source] DownloadError),
}

/// Delay policy between downloads.
#[derive(Debug, Clone, Default)]
pub enum Pacing {
    /// Back-to-back downloads.
    #[default]
    None,
    /// Random delays and breaks drawn from the human-behavior settings.
    Human(HumanBehavior),
}

/// Which URLs a cycle considers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleScope {
    /// Crawl the listing pages and plan their union with the ledgers.
    #[default]
    Crawl,
    /// Skip the crawl; download ledger URLs that are not yet on disk.
    PendingOnly,
}

/// Per-cycle options chosen by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Forces a mode; `None` derives it from the first-run marker.
    pub mode: Option<RunMode>,
    pub scope: CycleScope,
    /// Re-fetch tracked documents to detect content changes.
    pub change_detection: bool,
    pub pacing: Pacing,
    /// Stop starting new downloads after this long (monitoring mode only).
    pub session_budget: Option<Duration>,
    /// Set from outside (Ctrl-C) to stop at the next checkpoint.
    pub interrupted: Arc<AtomicBool>,
}

impl CycleOptions {
    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Counts reported at the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub mode: RunMode,
    /// Distinct document URLs returned by the crawl.
    pub discovered: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Ledger entries corrected from files already on disk.
    pub backfilled: usize,
    /// Planned entries that needed no fetch.
    pub skipped: usize,
    /// Downloads left for the next cycle because the session budget ran out.
    pub deferred: usize,
    /// Listing pages that could not be crawled.
    pub crawl_failures: usize,
    /// The first-run marker was written by this cycle.
    pub first_run_completed: bool,
    /// The cycle stopped early on request; unstarted downloads are deferred.
    pub interrupted: bool,
}

impl CycleSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            discovered: 0,
            new: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            backfilled: 0,
            skipped: 0,
            deferred: 0,
            crawl_failures: 0,
            first_run_completed: false,
            interrupted: false,
        }
    }
}

/// Drives cycles against one configuration.
pub struct MonitorCycle {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    store: LedgerStore,
    layout: StorageLayout,
}

impl std::fmt::Debug for MonitorCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCycle")
            .field("state_dir", &self.store.state_dir())
            .field("download_dir", &self.layout.download_dir())
            .field("method", &self.fetcher.method())
            .finish_non_exhaustive()
    }
}

impl MonitorCycle {
    #[must_use]
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = LedgerStore::new(&config.state_dir);
        let layout = StorageLayout::new(&config.download_dir, config.max_filename_length);
        Self {
            config,
            fetcher,
            store,
            layout,
        }
    }

    /// Builds the fetcher selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Fetcher`] if the HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self, CycleError> {
        let fetcher = build_fetcher(&config).map_err(CycleError::Fetcher)?;
        Ok(Self::new(config, Arc::from(fetcher)))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// True while no cycle has completed the first run.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        !self.store.load_first_run().completed
    }

    /// Options for an ordinary cycle under this configuration.
    #[must_use]
    pub fn default_options(&self) -> CycleOptions {
        CycleOptions {
            mode: None,
            scope: CycleScope::Crawl,
            change_detection: self.config.change_detection,
            pacing: Pacing::Human(self.config.human_behavior.clone()),
            session_budget: None,
            interrupted: Arc::default(),
        }
    }

    fn reconciler(&self, change_detection: bool) -> Reconciler {
        Reconciler::new(self.layout.clone()).with_change_detection(change_detection)
    }

    /// Runs one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Ledger`] when the state lock is held by another
    /// run or the final ledger save fails.
    ///
    /// Setting [`CycleOptions::interrupted`] stops the cycle before the next
    /// listing page or download; the ledgers are still saved.
    #[instrument(skip(self, options), fields(scope = ?options.scope))]
    pub async fn run(&self, options: &CycleOptions) -> Result<CycleSummary, CycleError> {
        let _lock = self.store.lock()?;
        let mut ledgers = self.store.load();
        let mode = options
            .mode
            .unwrap_or_else(|| RunMode::from_ledgers(&ledgers));
        let mut summary = CycleSummary::new(mode);
        let now = Utc::now();

        info!(mode = ?mode, "cycle starting");

        let reconciler = self.reconciler(options.change_detection);
        let plan = match options.scope {
            CycleScope::Crawl => {
                let discovered = self.crawl(options, &mut summary).await;
                summary.discovered = discovered.len();
                reconciler.reconcile(&discovered, &mut ledgers, mode, now)
            }
            CycleScope::PendingOnly => reconciler.audit(&mut ledgers, now),
        };
        summary.backfilled = plan.backfilled();
        summary.skipped = plan.entries.len() - plan.downloads().count();
        self.checkpoint(&ledgers);

        self.execute_plan(&plan, &mut ledgers, options, &mut summary)
            .await;

        self.store.save(&ledgers)?;

        if mode == RunMode::FirstRun
            && options.scope == CycleScope::Crawl
            && !summary.interrupted
            && summary.crawl_failures == 0
            && summary.deferred == 0
            && ledgers.is_first_run()
        {
            ledgers.mark_first_run_completed(Utc::now());
            self.store.save_first_run(&ledgers.first_run)?;
            summary.first_run_completed = true;
            info!("first run completed, later cycles only monitor for changes");
        }

        info!(
            new = summary.new,
            updated = summary.updated,
            unchanged = summary.unchanged,
            failed = summary.failed,
            backfilled = summary.backfilled,
            skipped = summary.skipped,
            deferred = summary.deferred,
            interrupted = summary.interrupted,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Reconciles the ledgers with the disk without any network access and
    /// saves the backfills.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Ledger`] if the lock is held or saving fails.
    #[instrument(skip(self))]
    pub fn audit(&self) -> Result<ActionPlan, CycleError> {
        let _lock = self.store.lock()?;
        let mut ledgers = self.store.load();
        let plan = self.reconciler(false).audit(&mut ledgers, Utc::now());
        if plan.backfilled() > 0 {
            self.store.save(&ledgers)?;
        }
        Ok(plan)
    }

    async fn crawl(&self, options: &CycleOptions, summary: &mut CycleSummary) -> Vec<String> {
        let mut discovered = Vec::new();
        for listing_url in &self.config.urls {
            if options.is_interrupted() {
                info!("interrupted, crawl cut short");
                summary.interrupted = true;
                break;
            }
            match self.fetcher.list_documents(listing_url).await {
                Ok(urls) => {
                    info!(listing_url = %listing_url, found = urls.len(), "listing crawled");
                    for url in urls {
                        if !discovered.contains(&url) {
                            discovered.push(url);
                        }
                    }
                }
                Err(error) => {
                    warn!(listing_url = %listing_url, error = %error, "listing crawl failed");
                    summary.crawl_failures += 1;
                }
            }
        }
        discovered
    }

    async fn execute_plan(
        &self,
        plan: &ActionPlan,
        ledgers: &mut Ledgers,
        options: &CycleOptions,
        summary: &mut CycleSummary,
    ) {
        let executor = DownloadExecutor::new(
            Arc::clone(&self.fetcher),
            RetryPolicy::with_max_attempts(self.config.max_retries),
        )
        .with_min_file_size(self.config.min_file_size)
        .with_max_filename_length(self.config.max_filename_length)
        .with_interrupt(Arc::clone(&options.interrupted));

        let budget = match summary.mode {
            RunMode::Monitoring => options.session_budget,
            RunMode::FirstRun => None,
        };
        let started = Instant::now();
        let downloads: Vec<_> = plan.downloads().collect();
        let total = downloads.len();

        for (index, entry) in downloads.into_iter().enumerate() {
            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                summary.deferred = total - index;
                info!(deferred = summary.deferred, "session budget spent, deferring the rest");
                break;
            }
            if index > 0 {
                self.pause(options).await;
            }
            if options.is_interrupted() {
                summary.interrupted = true;
                summary.deferred = total - index;
                info!(deferred = summary.deferred, "interrupted, deferring the rest");
                break;
            }

            info!(
                position = index + 1,
                total,
                url = %entry.url,
                action = ?entry.action,
                "processing"
            );

            match executor.execute(&entry.url, &entry.target, ledgers).await {
                ExecuteOutcome::New { .. } => summary.new += 1,
                ExecuteOutcome::Updated { .. } => summary.updated += 1,
                ExecuteOutcome::Unchanged { .. } => summary.unchanged += 1,
                ExecuteOutcome::Failed(error) => {
                    summary.failed += 1;
                    if error.is_filesystem() {
                        error!(url = %entry.url, error = %error, "cannot write document");
                    }
                    continue;
                }
            }
            self.checkpoint(ledgers);
        }
    }

    /// Best-effort save between documents; the final save reports errors.
    fn checkpoint(&self, ledgers: &Ledgers) {
        if let Err(error) = self.store.save(ledgers) {
            warn!(error = %error, "ledger checkpoint failed");
        }
    }

    async fn pause(&self, options: &CycleOptions) {
        let Pacing::Human(behavior) = &options.pacing else {
            return;
        };
        let delay = schedule::pacing_delay(behavior, &mut rand::thread_rng());
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "pausing between downloads");
            schedule::sleep_unless_interrupted(delay, &options.interrupted).await;
        }
    }
}
