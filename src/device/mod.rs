//! Device access module
//!
//! The crawler talks to devices through the [`DeviceClient`] trait so the
//! traversal engine never depends on a particular transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    DeviceClient                      │
//! │  - Shared by all workers (Send + Sync)              │
//! │  - connect() opens one session per visit            │
//! └──────────────────────────┬──────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   DeviceSession                      │
//! │  - Owned by a single worker for one visit           │
//! │  - execute("show version"), execute("show cdp ...") │
//! │  - close() when the visit is done                   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod ssh;
pub mod types;

use crate::error::DeviceResult;
use std::time::Duration;

pub use ssh::SshDeviceClient;
pub use types::{
    Credentials, DeviceIdentity, DeviceRecord, DeviceTypePolicy, NeighborRef, PendingVisit,
    DEFAULT_DEVICE_TYPE, DEFAULT_SSH_PORT,
};

/// Command that returns identity facts
pub const SHOW_VERSION: &str = "show version";

/// Command that returns CDP neighbor facts
pub const SHOW_CDP_NEIGHBORS: &str = "show cdp neighbors detail";

/// An open session to one device
pub trait DeviceSession: Send {
    /// Run a command and return its raw text output
    fn execute(&mut self, command: &str) -> DeviceResult<String>;

    /// Close the session. Errors are logged, never returned.
    fn close(self: Box<Self>);
}

/// Opens sessions to devices
pub trait DeviceClient: Send + Sync {
    /// Connect to the device described by `visit`
    ///
    /// `timeout` bounds the connect and each later command on the session.
    fn connect(&self, visit: &PendingVisit, timeout: Duration) -> DeviceResult<Box<dyn DeviceSession>>;
}
