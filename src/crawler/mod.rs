//! Concurrent topology traversal
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CrawlEngine                          │
//! │  - Seeds the frontier, spawns workers                    │
//! │  - Waits for outstanding work to reach zero              │
//! │  - Requests shutdown, joins workers within a grace period │
//! └───────────────┬──────────────────────────┬───────────────┘
//!                 │                          │
//!                 ▼                          ▼
//! ┌───────────────────────────┐  ┌───────────────────────────┐
//! │         Frontier          │  │    ShutdownController     │
//! │  push / pop / wait / close│◄─┤  hooks: frontier.close()  │
//! └─────────────┬─────────────┘  └───────────────────────────┘
//!               │ Claim
//!               ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Workers (N threads)                      │
//! │  try_admit ─► connect ─► show version ─► show cdp ...    │
//! │  ─► repository.upsert ─► push neighbors ─► complete      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod frontier;
pub mod registry;
pub mod shutdown;
pub mod worker;

pub use engine::{CrawlEngine, CrawlProgress, CrawlSummary, EngineOptions, ProgressHandle};
pub use frontier::{Claim, Frontier, FrontierCounts, FrontierStats, WaitStatus};
pub use registry::{normalize_address, VisitedRegistry};
pub use shutdown::{ShutdownController, ShutdownReason};
pub use worker::{CrawlStats, Worker, WorkerState};
