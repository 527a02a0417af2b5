//! Database schema definitions and creation
//!
//! One row per discovered device plus a key/value table of crawl metadata.

use crate::error::DbResult;
use rusqlite::Connection;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the devices table
/// Neighbors are a JSON array of neighbor objects.
const CREATE_DEVICES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY,
    address TEXT NOT NULL UNIQUE,
    hostname TEXT NOT NULL DEFAULT '',
    device_type TEXT NOT NULL DEFAULT '',
    serial_number TEXT NOT NULL DEFAULT '',
    platform TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '',
    neighbors TEXT NOT NULL DEFAULT '[]',
    first_seen TEXT NOT NULL,     -- RFC 3339
    last_seen TEXT NOT NULL
)
"#;

/// SQL to create crawl metadata table
const CREATE_CRAWL_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS crawl_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_devices_hostname ON devices(hostname)",
    "CREATE INDEX IF NOT EXISTS idx_devices_platform ON devices(platform)",
];

/// Pragmas for concurrent access from worker threads
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
PRAGMA busy_timeout = 5000;
"#;

/// Create and configure the database
pub fn create_database(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(PRAGMAS)?;

    conn.execute(CREATE_DEVICES_TABLE, [])?;
    conn.execute(CREATE_CRAWL_INFO_TABLE, [])?;
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    Ok(())
}

/// Store crawl metadata
pub fn set_crawl_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO crawl_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get crawl metadata
pub fn get_crawl_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM crawl_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All crawl metadata, ordered by key
pub fn all_crawl_info(conn: &Connection) -> DbResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, COALESCE(value, '') FROM crawl_info ORDER BY key")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Metadata keys used by the crawler
pub mod keys {
    /// Seed address the crawl started from
    pub const SEED: &str = "seed";

    /// Timestamp when crawl started (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when crawl finished (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Total duration in milliseconds
    pub const DURATION_MS: &str = "duration_ms";

    /// Number of worker threads used
    pub const WORKER_COUNT: &str = "worker_count";

    /// Devices visited
    pub const VISITED_COUNT: &str = "visited_count";

    /// Failed visits
    pub const FAILED_COUNT: &str = "failed_count";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Crawler version
    pub const CRAWLER_VERSION: &str = "crawler_version";

    /// Crawl status: "running", "completed", "interrupted", "requested"
    pub const STATUS: &str = "status";
}
