//! cdp-crawler - Concurrent CDP Network Topology Crawler
//!
//! Discovers a network by logging into a seed device, reading its identity
//! and CDP neighbor table, and visiting every neighbor in turn until no new
//! devices remain. Results are stored in SQLite and exported to CSV.
//!
//! # Features
//!
//! - **Parallel Crawling**: A fixed pool of worker threads, each with its
//!   own SSH session per device.
//!
//! - **Exactly-Once Visits**: Addresses are normalized and admitted through
//!   a single test-and-set, so a device reported by many neighbors is
//!   visited once.
//!
//! - **Clean Termination**: Outstanding-work tracking detects the end of
//!   the crawl; Ctrl-C lets in-flight visits finish and drops queued ones.
//!
//! - **Failure Containment**: Unreachable devices, unparseable output,
//!   and storage errors are counted and logged without stopping the crawl.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Network Devices (SSH)                        │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ show version / show cdp neighbors detail
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │            │            │                    │          │
//! │       └────────────┼────────────┼────────────────────┘          │
//! │                    ▼            ▼                               │
//! │   ┌──────────────────────┐  ┌──────────────────────┐            │
//! │   │      Frontier        │  │   VisitedRegistry    │            │
//! │   │ (crossbeam channel,  │  │ (normalized address  │            │
//! │   │  outstanding count)  │  │  set, test-and-set)  │            │
//! │   └──────────────────────┘  └──────────────────────┘            │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ upsert
//!                               ▼
//!                    ┌──────────────────┐
//!                    │   SQLite DB      │ ──► devices.csv
//!                    │   (crawl.db)     │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Crawl from a core switch with 16 workers
//! CDP_PASSWORD=secret cdp-crawler crawl 10.0.0.1 -u admin -w 16
//!
//! # Inspect the result
//! cdp-crawler status --database crawl.db
//! ```

pub mod config;
pub mod crawler;
pub mod db;
pub mod device;
pub mod error;
pub mod parser;
pub mod progress;

pub use config::{CliArgs, CrawlConfig};
pub use crawler::{CrawlEngine, CrawlSummary, EngineOptions, ShutdownController, ShutdownReason};
pub use error::{CrawlerError, Result};
