//! Device record storage and export
//!
//! Workers persist records through the [`Repository`] trait. Every call is
//! independent; implementations synchronize internally.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Worker Threads (N)                      │
//! │  - upsert(record) after each successful visit       │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │      SqliteRepository / MemoryRepository             │
//! │  - Idempotent upsert keyed by address               │
//! │  - list_all() in address order                      │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ export_to(path)
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   CSV file                           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod export;
pub mod memory;
pub mod schema;
pub mod sqlite;

use crate::device::DeviceRecord;
use crate::error::DbResult;
use std::path::Path;

pub use export::{write_csv, CSV_HEADERS};
pub use memory::MemoryRepository;
pub use schema::{create_database, keys};
pub use sqlite::SqliteRepository;

/// Persists device records
pub trait Repository: Send + Sync {
    /// Insert or replace the record for `record.address`
    fn upsert(&self, record: &DeviceRecord) -> DbResult<()>;

    /// All stored records, ordered by address
    fn list_all(&self) -> DbResult<Vec<DeviceRecord>>;

    /// Write every stored record to a CSV file, returning the row count
    fn export_to(&self, path: &Path) -> DbResult<usize> {
        let records = self.list_all()?;
        write_csv(path, &records)
    }
}
