//! Shared work queue of pending device visits
//!
//! The frontier tracks outstanding work: an item counts from the moment it
//! is pushed until the worker that popped it completes its [`Claim`].
//! When the count drops to zero, [`Frontier::wait`] returns.
//!
//! With a capacity set, the channel is bounded. A push that finds it full
//! spills to an overflow list instead of blocking: workers are the only
//! consumers, so a worker blocked on a full queue could stall the pool.

use crate::device::PendingVisit;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Statistics for the frontier
#[derive(Debug, Default)]
pub struct FrontierStats {
    /// Items accepted by push
    pub pushed: AtomicU64,

    /// Items handed to workers
    pub popped: AtomicU64,

    /// Claims completed
    pub completed: AtomicU64,

    /// Items dropped from the queue by close
    pub discarded: AtomicU64,

    /// Pushes refused because the frontier was closed
    pub rejected: AtomicU64,

    /// Pushes that found the bounded queue full
    pub backpressure: AtomicU64,
}

impl FrontierStats {
    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> FrontierCounts {
        FrontierCounts {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
        }
    }
}

/// Frontier counters at the end of (or during) a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub pushed: u64,
    pub popped: u64,
    pub completed: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub backpressure: u64,
}

/// Why [`Frontier::wait`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Outstanding work reached zero
    Drained,

    /// The frontier was closed
    Closed,
}

#[derive(Debug, Default)]
struct State {
    outstanding: usize,
    closed: bool,
}

/// Multi-producer/multi-consumer queue with outstanding-work tracking
pub struct Frontier {
    sender: Sender<PendingVisit>,
    receiver: Receiver<PendingVisit>,

    /// Items that did not fit in the bounded channel
    overflow: Mutex<VecDeque<PendingVisit>>,

    capacity: Option<usize>,

    state: Mutex<State>,
    drained: Condvar,

    /// Mirror of `state.closed` for lock-free checks in `pop`
    closed: AtomicBool,

    stats: FrontierStats,
}

impl Frontier {
    /// Create an unbounded frontier
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a frontier, bounded when `capacity` is set
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };

        Self {
            sender,
            receiver,
            overflow: Mutex::new(VecDeque::new()),
            capacity,
            state: Mutex::new(State::default()),
            drained: Condvar::new(),
            closed: AtomicBool::new(false),
            stats: FrontierStats::default(),
        }
    }

    /// Enqueue a visit
    ///
    /// Returns false (and drops the item) if the frontier is closed.
    pub fn push(&self, visit: PendingVisit) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(address = %visit.address, "Frontier closed, visit dropped");
            return false;
        }

        state.outstanding += 1;
        trace!(address = %visit.address, depth = visit.depth, "Visit queued");

        if let Err(e) = self.sender.try_send(visit) {
            if matches!(e, TrySendError::Full(_)) {
                self.stats.backpressure.fetch_add(1, Ordering::Relaxed);
            }
            self.overflow.lock().push_back(e.into_inner());
        }

        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Take the next visit, waiting up to `timeout`
    ///
    /// Returns None on timeout, and immediately once the frontier is closed.
    pub fn pop(&self, timeout: Duration) -> Option<Claim<'_>> {
        if self.is_closed() {
            return None;
        }

        let visit = match self.receiver.try_recv() {
            Ok(visit) => visit,
            Err(_) => {
                // The overflow guard must be gone before blocking on the channel
                let spilled = self.overflow.lock().pop_front();
                match spilled {
                    Some(visit) => visit,
                    None => self.receiver.recv_timeout(timeout).ok()?,
                }
            }
        };

        if self.capacity.is_some() {
            self.refill();
        }

        if self.is_closed() {
            // Raced with close: the item was taken before it could be drained
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            self.release(1);
            return None;
        }

        self.stats.popped.fetch_add(1, Ordering::Relaxed);
        Some(Claim {
            frontier: self,
            visit,
            done: false,
        })
    }

    /// Move spilled items into freed channel slots
    fn refill(&self) {
        let mut overflow = self.overflow.lock();
        while let Some(visit) = overflow.pop_front() {
            if let Err(e) = self.sender.try_send(visit) {
                overflow.push_front(e.into_inner());
                break;
            }
        }
    }

    /// Block until outstanding work reaches zero or the frontier is closed
    pub fn wait(&self) -> WaitStatus {
        let mut state = self.state.lock();
        while state.outstanding > 0 && !state.closed {
            self.drained.wait(&mut state);
        }
        Self::status(&state)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WaitStatus> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.outstanding > 0 && !state.closed {
            if self.drained.wait_until(&mut state, deadline).timed_out() {
                if state.outstanding > 0 && !state.closed {
                    return None;
                }
                break;
            }
        }
        Some(Self::status(&state))
    }

    fn status(state: &State) -> WaitStatus {
        if state.closed {
            WaitStatus::Closed
        } else {
            WaitStatus::Drained
        }
    }

    /// Close the frontier
    ///
    /// Queued items are discarded and every waiter is released. Later
    /// pushes are rejected and pops return None. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.closed.store(true, Ordering::SeqCst);

        // Overflow first: refill moves items from it into the channel
        let mut discarded = {
            let mut overflow = self.overflow.lock();
            let n = overflow.len();
            overflow.clear();
            n
        };
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }

        state.outstanding = state.outstanding.saturating_sub(discarded);
        self.stats
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        self.drained.notify_all();

        debug!(
            discarded,
            in_flight = state.outstanding,
            "Frontier closed"
        );
    }

    fn release(&self, count: usize) {
        let mut state = self.state.lock();
        if state.outstanding < count {
            warn!(
                outstanding = state.outstanding,
                count, "Outstanding work underflow"
            );
            state.outstanding = 0;
        } else {
            state.outstanding -= count;
        }

        if state.outstanding == 0 {
            self.drained.notify_all();
        }
    }

    /// Items waiting in the queue
    pub fn len(&self) -> usize {
        self.receiver.len() + self.overflow.lock().len()
    }

    /// Check if no items are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items pushed but not yet completed
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &FrontierStats {
        &self.stats
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

/// A popped visit that must be completed exactly once
///
/// Dropping the claim completes it, so a visit that unwinds still
/// releases its outstanding count.
pub struct Claim<'a> {
    frontier: &'a Frontier,
    visit: PendingVisit,
    done: bool,
}

impl Claim<'_> {
    /// Mark the visit as fully processed
    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.frontier.stats.completed.fetch_add(1, Ordering::Relaxed);
            self.frontier.release(1);
        }
    }
}

impl Deref for Claim<'_> {
    type Target = PendingVisit;

    fn deref(&self) -> &PendingVisit {
        &self.visit
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
