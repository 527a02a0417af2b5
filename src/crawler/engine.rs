//! Crawl engine - orchestrates the parallel topology crawl
//!
//! The engine is responsible for:
//! - Building the frontier, registry, and worker pool for one run
//! - Seeding the frontier and waiting for it to drain
//! - Stopping workers on completion or external shutdown
//! - Final statistics

use crate::crawler::frontier::{Frontier, FrontierCounts, WaitStatus};
use crate::crawler::registry::VisitedRegistry;
use crate::crawler::shutdown::{ShutdownController, ShutdownReason};
use crate::crawler::worker::{CrawlStats, Worker, WorkerContext};
use crate::db::Repository;
use crate::device::{DeviceClient, DeviceTypePolicy, PendingVisit};
use crate::error::{Result, WorkerError};
use crate::parser::OutputParser;
use regex::Regex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default interval for workers to re-check shutdown while idle
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time to wait for workers after shutdown
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default per-operation device timeout
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the engine checks on its workers while waiting
const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime options for one crawl
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of worker threads
    pub worker_count: usize,

    /// Timeout for connect and each device command
    pub op_timeout: Duration,

    /// Frontier pop timeout
    pub poll_interval: Duration,

    /// How long to wait for workers after shutdown
    pub grace_period: Duration,

    /// Bounded frontier capacity (None = unbounded)
    pub queue_capacity: Option<usize>,

    /// Maximum hops from the seed (None = unlimited)
    pub max_depth: Option<u32>,

    /// Addresses matching any of these are skipped
    pub exclude_patterns: Vec<Regex>,

    /// Device type assignment for neighbors
    pub device_type: DeviceTypePolicy,
}

impl EngineOptions {
    pub fn new(worker_count: usize, op_timeout: Duration) -> Self {
        Self {
            worker_count,
            op_timeout,
            ..Self::default()
        }
    }

    /// Check if a normalized address matches an exclusion pattern
    pub fn is_excluded(&self, address: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(address))
    }

    /// Check if a visit at `depth` may be queued
    pub fn within_depth(&self, depth: u32) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            worker_count: 4,
            op_timeout: DEFAULT_OP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            queue_capacity: None,
            max_depth: None,
            exclude_patterns: Vec::new(),
            device_type: DeviceTypePolicy::default(),
        }
    }
}

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Devices visited
    pub visited_count: u64,

    /// Failed visits (connection, parse, panic)
    pub failed_count: u64,

    pub connection_failures: u64,
    pub parse_failures: u64,

    /// Visits recorded without neighbors
    pub partial_count: u64,

    /// Records the repository refused
    pub persist_failures: u64,

    pub duplicates: u64,
    pub skipped: u64,

    /// Every admitted address, sorted
    pub admitted: Vec<String>,

    pub duration: Duration,

    /// Whether the crawl drained naturally (vs was interrupted)
    pub completed: bool,

    pub reason: ShutdownReason,

    /// Workers still running after the grace period
    pub abandoned_workers: usize,

    /// Queue counters (discarded by shutdown, spilled by backpressure, ...)
    pub frontier: FrontierCounts,
}

impl CrawlSummary {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

/// Point-in-time view of a running crawl
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub visited: u64,
    pub failed: u64,
    pub duplicates: u64,

    /// Items waiting in the frontier
    pub queued: usize,

    /// Items pushed but not completed
    pub outstanding: usize,

    pub active_workers: usize,
    pub total_workers: usize,
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Calculate devices per second rate
    pub fn devices_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.visited as f64 / secs
        } else {
            0.0
        }
    }
}

/// Read-only handle for progress reporting
#[derive(Clone)]
pub struct ProgressHandle {
    frontier: Arc<Frontier>,
    stats: Arc<CrawlStats>,
    total_workers: usize,
    start: Instant,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> CrawlProgress {
        CrawlProgress {
            visited: self.stats.visited(),
            failed: self.stats.failed(),
            duplicates: self.stats.duplicates(),
            queued: self.frontier.len(),
            outstanding: self.frontier.outstanding(),
            active_workers: self.stats.active_workers(),
            total_workers: self.total_workers,
            elapsed: self.start.elapsed(),
        }
    }
}

/// Coordinates the parallel crawl
pub struct CrawlEngine {
    options: Arc<EngineOptions>,
    frontier: Arc<Frontier>,
    registry: Arc<VisitedRegistry>,
    client: Arc<dyn DeviceClient>,
    parser: Arc<dyn OutputParser>,
    repository: Arc<dyn Repository>,
    shutdown: ShutdownController,
    stats: Arc<CrawlStats>,
}

impl CrawlEngine {
    /// Create an engine for one crawl run
    pub fn new(
        options: EngineOptions,
        client: Arc<dyn DeviceClient>,
        parser: Arc<dyn OutputParser>,
        repository: Arc<dyn Repository>,
    ) -> Self {
        let frontier = Arc::new(Frontier::with_capacity(options.queue_capacity));
        let shutdown = ShutdownController::new();

        let hook_frontier = Arc::clone(&frontier);
        shutdown.on_shutdown(move || hook_frontier.close());

        Self {
            options: Arc::new(options),
            frontier,
            registry: Arc::new(VisitedRegistry::new()),
            client,
            parser,
            repository,
            shutdown,
            stats: Arc::new(CrawlStats::default()),
        }
    }

    /// Get a shutdown handle (for signal handlers)
    pub fn shutdown_handle(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Get a handle for progress reporting
    pub fn progress_handle(&self) -> ProgressHandle {
        ProgressHandle {
            frontier: Arc::clone(&self.frontier),
            stats: Arc::clone(&self.stats),
            total_workers: self.options.worker_count,
            start: Instant::now(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run the crawl from `seed` until the frontier drains or shutdown
    ///
    /// Only failing to start any worker is an error; per-device failures
    /// are counted in the summary.
    pub fn run(self, seed: PendingVisit) -> Result<CrawlSummary> {
        let start = Instant::now();

        info!(
            seed = %seed.address,
            workers = self.options.worker_count,
            timeout_secs = self.options.op_timeout.as_secs(),
            "Starting crawl"
        );

        if !self.frontier.push(seed) {
            warn!("Shutdown requested before the crawl started");
        }

        let workers = self.spawn_workers();
        if workers.is_empty() {
            self.shutdown.request_shutdown(ShutdownReason::Requested);
            return Err(WorkerError::NoWorkers {
                requested: self.options.worker_count,
            }
            .into());
        }

        self.wait_for_completion(&workers);

        // No-op if shutdown was already requested
        self.shutdown.request_shutdown(ShutdownReason::Completed);

        let abandoned_workers = self.join_workers(workers);
        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Completed);
        let duration = start.elapsed();

        let summary = CrawlSummary {
            visited_count: self.stats.visited(),
            failed_count: self.stats.failed(),
            connection_failures: self.stats.connection_failures.load(Ordering::Relaxed),
            parse_failures: self.stats.parse_failures.load(Ordering::Relaxed),
            partial_count: self.stats.partial.load(Ordering::Relaxed),
            persist_failures: self.stats.persist_failures.load(Ordering::Relaxed),
            duplicates: self.stats.duplicates(),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            admitted: self.registry.snapshot(),
            duration,
            completed: reason == ShutdownReason::Completed,
            reason,
            abandoned_workers,
            frontier: self.frontier.stats().snapshot(),
        };

        info!(
            visited = summary.visited_count,
            failed = summary.failed_count,
            duplicates = summary.duplicates,
            discarded = summary.frontier.discarded,
            backpressure = summary.frontier.backpressure,
            reason = %summary.reason,
            duration_ms = summary.duration_ms() as u64,
            "Crawl finished"
        );

        Ok(summary)
    }

    /// Spawn worker threads, tolerating individual spawn failures
    fn spawn_workers(&self) -> Vec<Worker> {
        let ctx = WorkerContext {
            frontier: Arc::clone(&self.frontier),
            registry: Arc::clone(&self.registry),
            client: Arc::clone(&self.client),
            parser: Arc::clone(&self.parser),
            repository: Arc::clone(&self.repository),
            shutdown: self.shutdown.clone(),
            stats: Arc::clone(&self.stats),
            options: Arc::clone(&self.options),
        };

        let mut workers = Vec::with_capacity(self.options.worker_count);
        for id in 0..self.options.worker_count {
            match Worker::spawn(id, ctx.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => error!(worker = id, error = %e, "Failed to start worker"),
            }
        }

        info!(count = workers.len(), "Workers spawned");
        workers
    }

    /// Block until the frontier drains or is closed by shutdown
    fn wait_for_completion(&self, workers: &[Worker]) {
        loop {
            if let Some(status) = self.frontier.wait_timeout(LIVENESS_CHECK_INTERVAL) {
                match status {
                    WaitStatus::Drained => debug!("Frontier drained"),
                    WaitStatus::Closed => debug!("Frontier closed"),
                }
                return;
            }

            if workers.iter().all(Worker::is_finished) {
                error!(
                    outstanding = self.frontier.outstanding(),
                    "All workers exited with work outstanding"
                );
                self.shutdown.request_shutdown(ShutdownReason::Requested);
                return;
            }
        }
    }

    /// Join workers within the grace period, returning how many were abandoned
    fn join_workers(&self, workers: Vec<Worker>) -> usize {
        let grace = self.options.grace_period;
        let deadline = Instant::now() + grace;
        let mut abandoned = 0;

        for worker in workers {
            let id = worker.id();
            let state = worker.state();
            match worker.join_until(deadline, grace) {
                Ok(()) => {}
                Err(e @ WorkerError::NonTerminating { .. }) => {
                    warn!(worker = id, state = ?state, error = %e, "Abandoning worker");
                    abandoned += 1;
                }
                Err(e) => warn!(worker = id, error = %e, "Worker failed to join cleanly"),
            }
        }

        abandoned
    }
}
