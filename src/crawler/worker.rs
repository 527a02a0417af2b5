//! Worker thread logic for the parallel crawl
//!
//! Each worker:
//! - Pulls pending visits from the frontier
//! - Admits the address through the visited registry
//! - Opens its own device session and collects identity and neighbor facts
//! - Hands the record to the repository
//! - Pushes newly discovered neighbors back onto the frontier

use crate::crawler::engine::EngineOptions;
use crate::crawler::frontier::Frontier;
use crate::crawler::registry::{normalize_address, VisitedRegistry};
use crate::crawler::shutdown::ShutdownController;
use crate::db::Repository;
use crate::device::{DeviceClient, DeviceRecord, DeviceSession, PendingVisit, SHOW_CDP_NEIGHBORS, SHOW_VERSION};
use crate::error::{CrawlerError, VisitOutcome, WorkerError};
use crate::parser::OutputParser;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Statistics shared by all workers
#[derive(Debug, Default)]
pub struct CrawlStats {
    /// Devices visited (record produced)
    pub visited: AtomicU64,

    /// Failed visits of any kind
    pub failed: AtomicU64,

    /// Unreachable or rejected devices
    pub connection_failures: AtomicU64,

    /// Unparseable identity output
    pub parse_failures: AtomicU64,

    /// Visits that panicked
    pub panics: AtomicU64,

    /// Visits recorded without neighbor facts
    pub partial: AtomicU64,

    /// Records the repository refused
    pub persist_failures: AtomicU64,

    /// Addresses already admitted
    pub duplicates: AtomicU64,

    /// Visits skipped by policy
    pub skipped: AtomicU64,

    /// Neighbors pushed onto the frontier
    pub enqueued: AtomicU64,

    /// Workers currently processing a visit
    pub active_workers: AtomicUsize,
}

impl CrawlStats {
    /// Count a visit outcome
    pub fn record(&self, outcome: &VisitOutcome) {
        match outcome {
            VisitOutcome::Visited {
                enqueued,
                partial,
                persisted,
                ..
            } => {
                self.visited.fetch_add(1, Ordering::Relaxed);
                self.enqueued.fetch_add(*enqueued as u64, Ordering::Relaxed);
                if *partial {
                    self.partial.fetch_add(1, Ordering::Relaxed);
                }
                if !*persisted {
                    self.persist_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            VisitOutcome::Duplicate { .. } => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            VisitOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            VisitOutcome::ConnectionFailed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.connection_failures.fetch_add(1, Ordering::Relaxed);
            }
            VisitOutcome::ParseFailed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
            }
            VisitOutcome::Panicked { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.panics.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn visited(&self) -> u64 {
        self.visited.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }
}

/// RAII guard for marking a worker as busy
struct ActiveGuard<'a> {
    stats: &'a CrawlStats,
}

impl<'a> ActiveGuard<'a> {
    fn new(stats: &'a CrawlStats) -> Self {
        stats.active_workers.fetch_add(1, Ordering::Relaxed);
        Self { stats }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.stats.active_workers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Lifecycle of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    Idle = 1,
    Processing = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Idle,
            2 => WorkerState::Processing,
            _ => WorkerState::Stopped,
        }
    }
}

/// Shared handles every worker needs
#[derive(Clone)]
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub registry: Arc<VisitedRegistry>,
    pub client: Arc<dyn DeviceClient>,
    pub parser: Arc<dyn OutputParser>,
    pub repository: Arc<dyn Repository>,
    pub shutdown: ShutdownController,
    pub stats: Arc<CrawlStats>,
    pub options: Arc<EngineOptions>,
}

/// A worker thread that visits devices
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    state: Arc<AtomicU8>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let state = Arc::new(AtomicU8::new(WorkerState::Running as u8));
        let state_clone = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name(format!("crawler-{}", id))
            .spawn(move || worker_loop(id, ctx, state_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            state,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Check if the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
                id: self.id,
                message: panic_message(payload.as_ref()),
            }),
            None => Ok(()),
        }
    }

    /// Wait for the worker until `deadline`
    ///
    /// A worker still running at the deadline is left detached.
    pub fn join_until(self, deadline: Instant, grace: Duration) -> Result<(), WorkerError> {
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return Err(WorkerError::NonTerminating {
                    id: self.id,
                    grace_ms: grace.as_millis(),
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.join()
    }
}

/// Main worker loop
fn worker_loop(id: usize, ctx: WorkerContext, state: Arc<AtomicU8>) {
    let set_state = |s: WorkerState| state.store(s as u8, Ordering::Relaxed);
    debug!(worker = id, "Worker starting");

    while !ctx.shutdown.is_shutting_down() {
        set_state(WorkerState::Idle);
        let claim = match ctx.frontier.pop(ctx.options.poll_interval) {
            Some(claim) => claim,
            None => continue, // Timeout - check shutdown and retry
        };

        set_state(WorkerState::Processing);
        let active = ActiveGuard::new(&ctx.stats);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| visit_device(id, &claim, &ctx)))
            .unwrap_or_else(|payload| VisitOutcome::Panicked {
                address: claim.address.clone(),
                message: panic_message(payload.as_ref()),
            });

        ctx.stats.record(&outcome);
        log_outcome(id, &outcome);

        drop(active);
        claim.complete();
        set_state(WorkerState::Running);
    }

    set_state(WorkerState::Stopped);
    debug!(worker = id, "Worker stopped");
}

fn log_outcome(id: usize, outcome: &VisitOutcome) {
    match outcome {
        VisitOutcome::Visited {
            address,
            neighbors,
            enqueued,
            partial,
            persisted,
        } => {
            info!(
                worker = id,
                address = %address,
                neighbors,
                enqueued,
                partial,
                persisted,
                "Device visited"
            );
        }
        VisitOutcome::Duplicate { address } => {
            debug!(worker = id, address = %address, "Already visited");
        }
        VisitOutcome::Skipped { address, reason } => {
            debug!(worker = id, address = %address, reason = %reason, "Device skipped");
        }
        VisitOutcome::ConnectionFailed { address, error } => {
            warn!(
                worker = id,
                address = %address,
                auth = error.is_auth_failure(),
                timeout = error.is_timeout(),
                error = %error,
                "Connection failed"
            );
        }
        VisitOutcome::ParseFailed { address, error } => {
            warn!(worker = id, address = %address, error = %error, "Failed to parse device output");
        }
        VisitOutcome::Panicked { address, message } => {
            warn!(worker = id, address = %address, message = %message, "Visit panicked");
        }
    }
}

/// Visit a single device
fn visit_device(id: usize, visit: &PendingVisit, ctx: &WorkerContext) -> VisitOutcome {
    let address = normalize_address(&visit.address);

    if address.is_empty() {
        return VisitOutcome::Skipped {
            address,
            reason: "Empty address".into(),
        };
    }

    if ctx.options.is_excluded(&address) {
        return VisitOutcome::Skipped {
            address,
            reason: "Matched exclusion pattern".into(),
        };
    }

    if !ctx.registry.try_admit(&address) {
        return VisitOutcome::Duplicate { address };
    }

    let mut session = match ctx.client.connect(visit, ctx.options.op_timeout) {
        Ok(session) => session,
        Err(error) => return VisitOutcome::ConnectionFailed { address, error },
    };

    let collected = collect_record(id, visit, &address, session.as_mut(), ctx);
    session.close();

    let (record, partial) = match collected {
        Ok(collected) => collected,
        Err(outcome) => return outcome,
    };

    let persisted = match ctx.repository.upsert(&record) {
        Ok(()) => true,
        Err(e) => {
            warn!(worker = id, address = %address, error = %e, "Failed to persist device");
            false
        }
    };

    let enqueued = expand_neighbors(id, visit, &record, ctx);

    VisitOutcome::Visited {
        address,
        neighbors: record.neighbors.len(),
        enqueued,
        partial,
        persisted,
    }
}

/// Run the identity and neighbor commands and build the record
///
/// Neighbor failures downgrade the visit to partial instead of failing it.
fn collect_record(
    id: usize,
    visit: &PendingVisit,
    address: &str,
    session: &mut dyn DeviceSession,
    ctx: &WorkerContext,
) -> Result<(DeviceRecord, bool), VisitOutcome> {
    let raw = session
        .execute(SHOW_VERSION)
        .map_err(|error| VisitOutcome::ConnectionFailed {
            address: address.to_string(),
            error,
        })?;

    let identity = ctx
        .parser
        .parse_identity(&raw)
        .map_err(|error| VisitOutcome::ParseFailed {
            address: address.to_string(),
            error,
        })?;

    let neighbors = session
        .execute(SHOW_CDP_NEIGHBORS)
        .map_err(CrawlerError::from)
        .and_then(|raw| ctx.parser.parse_neighbors(&raw).map_err(CrawlerError::from));

    let (neighbors, partial) = match neighbors {
        Ok(neighbors) => (neighbors, false),
        Err(e) => {
            warn!(
                worker = id,
                address = %address,
                error = %e,
                "Neighbor discovery failed, recording device without neighbors"
            );
            (Vec::new(), true)
        }
    };

    let record = DeviceRecord::from_identity(address, visit.device_type_hint.clone(), identity, neighbors);
    Ok((record, partial))
}

/// Push unseen neighbors onto the frontier, returning how many were queued
fn expand_neighbors(id: usize, visit: &PendingVisit, record: &DeviceRecord, ctx: &WorkerContext) -> usize {
    if record.neighbors.is_empty() {
        return 0;
    }

    if !ctx.options.within_depth(visit.depth + 1) {
        debug!(
            worker = id,
            address = %record.address,
            depth = visit.depth,
            "Max depth reached, neighbors not queued"
        );
        return 0;
    }

    let mut enqueued = 0;
    for neighbor in &record.neighbors {
        if neighbor.address.trim().is_empty() {
            trace!(worker = id, device_id = %neighbor.device_id, "Neighbor has no address");
            continue;
        }

        // Hint only; admission is decided when the neighbor is popped
        if ctx.registry.contains(&neighbor.address) {
            continue;
        }

        let next = visit.neighbor(neighbor.address.clone(), ctx.options.device_type.hint_for(neighbor));
        if ctx.frontier.push(next) {
            enqueued += 1;
        }
    }

    enqueued
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeviceError, ParseError};

    #[test]
    fn test_crawl_stats_record() {
        let stats = CrawlStats::default();

        stats.record(&VisitOutcome::Visited {
            address: "10.0.0.1".into(),
            neighbors: 3,
            enqueued: 2,
            partial: true,
            persisted: false,
        });
        stats.record(&VisitOutcome::Duplicate {
            address: "10.0.0.1".into(),
        });
        stats.record(&VisitOutcome::ConnectionFailed {
            address: "10.0.0.2".into(),
            error: DeviceError::Timeout {
                address: "10.0.0.2".into(),
                secs: 5,
            },
        });
        stats.record(&VisitOutcome::ParseFailed {
            address: "10.0.0.3".into(),
            error: ParseError::Unrecognized {
                command: SHOW_VERSION.into(),
            },
        });

        assert_eq!(stats.visited(), 1);
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.duplicates(), 1);
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.partial.load(Ordering::Relaxed), 1);
        assert_eq!(stats.persist_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.connection_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.parse_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_active_guard() {
        let stats = CrawlStats::default();
        {
            let _guard = ActiveGuard::new(&stats);
            assert_eq!(stats.active_workers(), 1);
        }
        assert_eq!(stats.active_workers(), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");

        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn test_worker_state_roundtrip() {
        for state in [
            WorkerState::Running,
            WorkerState::Idle,
            WorkerState::Processing,
            WorkerState::Stopped,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
    }
}
