//! SQLite-backed repository
//!
//! A single connection guarded by a mutex. Device writes are one statement
//! each, so holding the lock per call keeps workers from interleaving
//! partial writes.

use crate::crawler::CrawlSummary;
use crate::db::schema::{self, keys};
use crate::db::Repository;
use crate::device::{DeviceRecord, NeighborRef};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const UPSERT_DEVICE: &str = r#"
INSERT INTO devices (address, hostname, device_type, serial_number, platform, version, neighbors, first_seen, last_seen)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
ON CONFLICT(address) DO UPDATE SET
    hostname = excluded.hostname,
    device_type = excluded.device_type,
    serial_number = excluded.serial_number,
    platform = excluded.platform,
    version = excluded.version,
    neighbors = excluded.neighbors,
    last_seen = excluded.last_seen
"#;

const SELECT_DEVICES: &str = r#"
SELECT address, hostname, device_type, serial_number, platform, version, neighbors
FROM devices ORDER BY address
"#;

/// Devices table and crawl metadata in one SQLite file
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRepository {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                return Err(DbError::CreateFailed {
                    path: path.to_path_buf(),
                    reason: format!("directory '{}' does not exist", parent.display()),
                });
            }
        }

        let conn = Connection::open(path)?;
        schema::create_database(&conn)?;
        schema::set_crawl_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing database without touching its metadata
    pub fn open_existing(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Err(DbError::CreateFailed {
                path: path.to_path_buf(),
                reason: "database does not exist".into(),
            });
        }
        let conn = Connection::open(path)?;
        schema::create_database(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create a throwaway in-memory database
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_info(&self, key: &str, value: &str) -> DbResult<()> {
        schema::set_crawl_info(&self.conn.lock(), key, value)
    }

    pub fn get_info(&self, key: &str) -> DbResult<Option<String>> {
        schema::get_crawl_info(&self.conn.lock(), key)
    }

    /// All crawl metadata, ordered by key
    pub fn info(&self) -> DbResult<Vec<(String, String)>> {
        schema::all_crawl_info(&self.conn.lock())
    }

    /// Number of stored devices
    pub fn count(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// First time a device was stored
    pub fn first_seen(&self, address: &str) -> DbResult<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT first_seen FROM devices WHERE address = ?1",
                [address],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Record crawl start metadata
    pub fn record_crawl_start(&self, seed: &str, worker_count: usize) -> DbResult<()> {
        let conn = self.conn.lock();
        schema::set_crawl_info(&conn, keys::SEED, seed)?;
        schema::set_crawl_info(&conn, keys::START_TIME, &Utc::now().to_rfc3339())?;
        schema::set_crawl_info(&conn, keys::WORKER_COUNT, &worker_count.to_string())?;
        schema::set_crawl_info(&conn, keys::CRAWLER_VERSION, env!("CARGO_PKG_VERSION"))?;
        schema::set_crawl_info(&conn, keys::STATUS, "running")?;
        Ok(())
    }

    /// Record crawl end metadata
    pub fn record_crawl_end(&self, summary: &CrawlSummary) -> DbResult<()> {
        let conn = self.conn.lock();
        schema::set_crawl_info(&conn, keys::END_TIME, &Utc::now().to_rfc3339())?;
        schema::set_crawl_info(&conn, keys::DURATION_MS, &summary.duration_ms().to_string())?;
        schema::set_crawl_info(&conn, keys::VISITED_COUNT, &summary.visited_count.to_string())?;
        schema::set_crawl_info(&conn, keys::FAILED_COUNT, &summary.failed_count.to_string())?;
        schema::set_crawl_info(&conn, keys::STATUS, &summary.reason.to_string())?;
        Ok(())
    }
}

impl Repository for SqliteRepository {
    fn upsert(&self, record: &DeviceRecord) -> DbResult<()> {
        let neighbors = record.neighbors_json()?;
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            UPSERT_DEVICE,
            params![
                record.address,
                record.hostname,
                record.device_type,
                record.serial_number,
                record.platform,
                record.version,
                neighbors,
                now,
            ],
        )?;
        Ok(())
    }

    fn list_all(&self) -> DbResult<Vec<DeviceRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(SELECT_DEVICES)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    DeviceRecord {
                        address: row.get(0)?,
                        hostname: row.get(1)?,
                        device_type: row.get(2)?,
                        serial_number: row.get(3)?,
                        platform: row.get(4)?,
                        version: row.get(5)?,
                        neighbors: Vec::new(),
                    },
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut record, neighbors)| -> DbResult<DeviceRecord> {
                record.neighbors = serde_json::from_str::<Vec<NeighborRef>>(&neighbors)?;
                Ok(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ShutdownReason;
    use std::time::Duration;
    use tempfile::tempdir;

    fn record(address: &str) -> DeviceRecord {
        DeviceRecord {
            address: address.into(),
            hostname: format!("host-{}", address),
            device_type: "cisco_ios".into(),
            neighbors: vec![NeighborRef {
                device_id: "peer".into(),
                address: "10.9.9.9".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_and_list() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert(&record("10.0.0.2")).unwrap();
        repo.upsert(&record("10.0.0.1")).unwrap();

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].address, "10.0.0.1");
        assert_eq!(all[0].neighbors.len(), 1);
        assert_eq!(all[0].neighbors[0].address, "10.9.9.9");
        assert_eq!(all[0].serial_number, "");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let mut rec = record("10.0.0.1");
        repo.upsert(&rec).unwrap();
        let first = repo.first_seen("10.0.0.1").unwrap().unwrap();

        rec.hostname = "renamed".into();
        rec.neighbors.clear();
        repo.upsert(&rec).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let stored = &repo.list_all().unwrap()[0];
        assert_eq!(stored.hostname, "renamed");
        assert!(stored.neighbors.is_empty());
        assert_eq!(repo.first_seen("10.0.0.1").unwrap().unwrap(), first);
    }

    #[test]
    fn test_crawl_metadata() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.record_crawl_start("10.0.0.1", 8).unwrap();
        assert_eq!(repo.get_info(keys::STATUS).unwrap().as_deref(), Some("running"));

        let summary = CrawlSummary {
            visited_count: 3,
            failed_count: 1,
            connection_failures: 1,
            parse_failures: 0,
            partial_count: 0,
            persist_failures: 0,
            duplicates: 1,
            skipped: 0,
            admitted: vec!["10.0.0.1".into()],
            duration: Duration::from_millis(1500),
            completed: false,
            reason: ShutdownReason::Interrupted,
            abandoned_workers: 0,
            frontier: Default::default(),
        };
        repo.record_crawl_end(&summary).unwrap();

        assert_eq!(repo.get_info(keys::STATUS).unwrap().as_deref(), Some("interrupted"));
        assert_eq!(repo.get_info(keys::VISITED_COUNT).unwrap().as_deref(), Some("3"));
        assert_eq!(repo.get_info(keys::DURATION_MS).unwrap().as_deref(), Some("1500"));
        assert!(repo.info().unwrap().iter().any(|(k, v)| k == keys::SEED && v == "10.0.0.1"));
    }

    #[test]
    fn test_open_file_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.upsert(&record("10.0.0.1")).unwrap();
        }

        let repo = SqliteRepository::open_existing(&path).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("crawl.db");
        assert!(matches!(
            SqliteRepository::open(&path),
            Err(DbError::CreateFailed { .. })
        ));
        assert!(SqliteRepository::open_existing(&dir.path().join("nope.db")).is_err());
    }

    #[test]
    fn test_export_to_csv() {
        let dir = tempdir().unwrap();
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert(&record("10.0.0.1")).unwrap();

        let out = dir.path().join("devices.csv");
        assert_eq!(repo.export_to(&out).unwrap(), 1);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("host-10.0.0.1"));
    }
}
