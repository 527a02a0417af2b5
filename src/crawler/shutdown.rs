//! Cooperative cancellation shared by the engine, workers, and signal handler

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Why the crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Frontier drained
    Completed,

    /// Interrupt signal
    Interrupted,

    /// Requested programmatically (worker loss, embedding caller)
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::Completed => "completed",
            ShutdownReason::Interrupted => "interrupted",
            ShutdownReason::Requested => "requested",
        };
        f.write_str(s)
    }
}

type Hook = Box<dyn FnOnce() + Send>;

struct Inner {
    requested: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    hooks: Mutex<Vec<Hook>>,
}

/// Cloneable shutdown handle
///
/// The first request wins: its reason is kept and registered hooks run
/// once, on the requesting thread.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                reason: Mutex::new(None),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Request shutdown
    ///
    /// Returns true if this call initiated shutdown, false if it was
    /// already requested.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        {
            let mut recorded = self.inner.reason.lock();
            if recorded.is_some() {
                return false;
            }
            // Reason is visible before the flag, so observers never see None
            *recorded = Some(reason);
            self.inner.requested.store(true, Ordering::SeqCst);
        }
        info!(%reason, "Shutdown requested");

        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        for hook in hooks {
            hook();
        }
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Reason recorded by the first request
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.reason.lock()
    }

    /// Run `hook` when shutdown is requested
    ///
    /// Runs immediately if shutdown was already requested.
    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut hooks = self.inner.hooks.lock();
            if !self.is_shutting_down() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownController")
            .field("requested", &self.is_shutting_down())
            .field("reason", &self.reason())
            .finish()
    }
}
