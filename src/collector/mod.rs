//! Collector module - scan orchestration across a worker pool
//!
//! This module contains the main collection loop that coordinates all
//! aspects of a scan run, including:
//! - Loading and cleaning the page list
//! - Deduplicating against prior runs (or timeseries gating)
//! - Fanning tasks across a bounded worker pool
//! - Driving one browser session per page/variant pair
//! - Correlating the captured event log and persisting the result

mod pages;
mod task;

pub use pages::read_page_list;
pub use task::CrawlTask;

use crate::browser::{BrowserVariant, SessionError, SessionFactory};
use crate::config::Config;
use crate::devtools::{correlate, CorrelationError, PageScanResult};
use crate::storage::{ResultStore, StorageError, StoreFactory};
use crate::WebtraceError;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use url::Url;

/// Why a single page/variant scan failed
///
/// A failure is confined to its scan: the worker records it and moves on,
/// so one broken page never takes down the rest of the run.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("Browser session error: {0}")]
    Session(#[from] SessionError),

    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Outcome of one page/variant scan
enum ScanOutcome {
    Stored,
    /// Timeseries mode decided the last snapshot is still fresh.
    Skipped,
}

/// Aggregate counts for a completed run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkerTally {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

impl WorkerTally {
    fn merge(&mut self, other: &WorkerTally) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Main collector structure
///
/// Browser sessions and result stores come in through factories so the
/// whole orchestration layer can be driven by scripted fakes in tests.
pub struct Collector {
    config: Arc<Config>,
    sessions: Arc<dyn SessionFactory>,
    stores: Arc<dyn StoreFactory>,
}

impl Collector {
    /// Creates a new collector instance
    pub fn new(
        config: Config,
        sessions: Arc<dyn SessionFactory>,
        stores: Arc<dyn StoreFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            stores,
        }
    }

    /// Runs the full collection
    ///
    /// 1. Load and clean the page list
    /// 2. Build the task set (dropping already-scanned pages unless in
    ///    timeseries mode, where freshness is decided per variant)
    /// 3. Queue every task on a bounded channel
    /// 4. Spawn the worker pool and wait for it to drain the queue
    /// 5. Report aggregate counts
    pub async fn run(&self) -> Result<RunSummary, WebtraceError> {
        let start = Instant::now();

        let pages = read_page_list(Path::new(&self.config.collector.page_list))?;
        tracing::info!(
            "Loaded {} pages from {}",
            pages.len(),
            self.config.collector.page_list
        );

        let tasks = self.build_tasks(pages)?;
        if tasks.is_empty() {
            tracing::info!("No pages left to scan");
            return Ok(RunSummary {
                elapsed: start.elapsed(),
                ..RunSummary::default()
            });
        }

        tracing::info!(
            "Dispatching {} tasks across {} workers",
            tasks.len(),
            self.config.collector.pool_size
        );

        let (tx, rx) = mpsc::channel(tasks.len());
        for task in tasks {
            // Capacity covers every task, so this never waits
            if tx.send(task).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.collector.pool_size {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&self.config),
                Arc::clone(&self.sessions),
                Arc::clone(&self.stores),
                Arc::clone(&queue),
            ));
        }

        let mut tally = WorkerTally::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(worker_tally)) => tally.merge(&worker_tally),
                Ok(Err(e)) => tracing::error!("Worker could not open its result store: {}", e),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        let summary = RunSummary {
            attempted: tally.attempted,
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped: tally.skipped,
            elapsed: start.elapsed(),
        };

        tracing::info!(
            "Run complete: {} scans attempted, {} stored, {} failed, {} skipped in {:?}",
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.elapsed
        );

        Ok(summary)
    }

    /// Builds the task set for this run
    ///
    /// Outside timeseries mode a page that already has any stored scan is
    /// dropped here. In timeseries mode every page stays in; the freshness
    /// check happens per variant inside the worker.
    fn build_tasks(&self, pages: Vec<Url>) -> Result<Vec<CrawlTask>, WebtraceError> {
        let variants = self.config.browser.variants.clone();

        if self.config.collector.timeseries {
            return Ok(pages
                .into_iter()
                .map(|url| CrawlTask::new(url, variants.clone()))
                .collect());
        }

        let store = self.stores.open()?;
        let mut tasks = Vec::new();
        for url in pages {
            if store.page_exists(url.as_str())? {
                tracing::info!("Already scanned, skipping: {}", url);
                continue;
            }
            tasks.push(CrawlTask::new(url, variants.clone()));
        }
        Ok(tasks)
    }
}

/// Worker loop: pull tasks off the shared queue until it is drained
///
/// Each worker opens its own private result store; store handles are never
/// shared between workers.
async fn run_worker(
    worker_id: u32,
    config: Arc<Config>,
    sessions: Arc<dyn SessionFactory>,
    stores: Arc<dyn StoreFactory>,
    queue: Arc<Mutex<mpsc::Receiver<CrawlTask>>>,
) -> Result<WorkerTally, StorageError> {
    let mut store = stores.open()?;
    let mut tally = WorkerTally::default();

    loop {
        // Hold the queue lock only for the recv itself
        let task = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let task = match task {
            Some(task) => task,
            None => break,
        };

        process_task(worker_id, &config, sessions.as_ref(), store.as_mut(), &task, &mut tally)
            .await;
    }

    tracing::debug!(
        "Worker {} done: {} attempted, {} stored",
        worker_id,
        tally.attempted,
        tally.succeeded
    );
    Ok(tally)
}

/// Processes one task, scanning the page under every requested variant
async fn process_task(
    worker_id: u32,
    config: &Config,
    sessions: &dyn SessionFactory,
    store: &mut dyn ResultStore,
    task: &CrawlTask,
    tally: &mut WorkerTally,
) {
    for &variant in &task.variants {
        tally.attempted += 1;
        match scan_variant(config, sessions, store, &task.url, variant).await {
            Ok(ScanOutcome::Stored) => {
                tally.succeeded += 1;
                tracing::info!(
                    "Worker {} stored {} under {}",
                    worker_id,
                    task.url,
                    variant
                );
            }
            Ok(ScanOutcome::Skipped) => {
                tally.skipped += 1;
                tracing::info!(
                    "Worker {} skipped {} under {}: snapshot still fresh",
                    worker_id,
                    task.url,
                    variant
                );
            }
            Err(failure) => {
                tally.failed += 1;
                tracing::error!(
                    "Worker {} failed {} under {}: {}",
                    worker_id,
                    task.url,
                    variant,
                    failure
                );
                if let Err(e) = store.log_error(task.url.as_str(), &failure.to_string()) {
                    tracing::warn!("Could not record scan failure for {}: {}", task.url, e);
                }
            }
        }
    }
}

/// Scans one page under one variant: launch, load, correlate, store
///
/// The browser session is released on every exit path before the result is
/// examined, so a failed scan never leaks a browser.
async fn scan_variant(
    config: &Config,
    sessions: &dyn SessionFactory,
    store: &mut dyn ResultStore,
    url: &Url,
    variant: BrowserVariant,
) -> Result<ScanOutcome, TaskFailure> {
    if config.collector.timeseries {
        if let Some(last) = store.last_accessed(url.as_str(), variant.as_str())? {
            let age = Utc::now() - last;
            if age < chrono::Duration::minutes(config.collector.interval_minutes) {
                return Ok(ScanOutcome::Skipped);
            }
        }
    }

    let result = scan_once(config, sessions, url, variant).await?;
    store.store_result(&result)?;
    Ok(ScanOutcome::Stored)
}

/// Performs one browser scan without touching storage
///
/// Also used by the single-page mode, which prints the result instead of
/// persisting it.
pub async fn scan_once(
    config: &Config,
    sessions: &dyn SessionFactory,
    url: &Url,
    variant: BrowserVariant,
) -> Result<PageScanResult, TaskFailure> {
    let settle_wait = Duration::from_secs(config.browser.settle_wait_seconds);

    let mut session = sessions.launch(variant).await?;
    let captured = session.load_and_capture(url.as_str(), settle_wait).await;
    session.close().await;
    let capture = captured?;

    let correlation = correlate(&capture.log)?;
    if !correlation.duplicate_urls.is_empty() || correlation.orphan_events > 0 {
        tracing::debug!(
            "Event log for {}: {} duplicate URLs, {} orphan events, {} malformed entries",
            url,
            correlation.duplicate_urls.len(),
            correlation.orphan_events,
            correlation.malformed_entries
        );
    }

    Ok(PageScanResult {
        start_url: url.as_str().to_string(),
        final_url: capture.final_url,
        browser_type: variant.as_str().to_string(),
        browser_version: capture.browser_version,
        settle_wait_seconds: config.browser.settle_wait_seconds,
        title: capture.title,
        meta_description: capture.meta_description,
        language: capture.language,
        page_load_time_ms: correlation.page_load_time_ms,
        resources: correlation.resources,
        cookies: capture.cookies,
        links: capture.links,
        page_source: capture.page_source,
    })
}
