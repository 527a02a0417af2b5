//! In-memory repository

use crate::db::Repository;
use crate::device::DeviceRecord;
use crate::error::{DbError, DbResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Device records kept in an ordered map
///
/// Can be switched to refuse writes, which lets callers exercise the
/// persistence-failure path without a broken database.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<BTreeMap<String, DeviceRecord>>,
    unavailable: AtomicBool,
    upserts: AtomicU64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later upsert fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Look up one record
    pub fn get(&self, address: &str) -> Option<DeviceRecord> {
        self.records.lock().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Successful upsert calls, including overwrites
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
    }
}

impl Repository for MemoryRepository {
    fn upsert(&self, record: &DeviceRecord) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("repository marked unavailable".into()));
        }
        self.records
            .lock()
            .insert(record.address.clone(), record.clone());
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn list_all(&self) -> DbResult<Vec<DeviceRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, hostname: &str) -> DeviceRecord {
        DeviceRecord {
            address: address.into(),
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_replaces_by_address() {
        let repo = MemoryRepository::new();
        repo.upsert(&record("10.0.0.2", "b")).unwrap();
        repo.upsert(&record("10.0.0.1", "a")).unwrap();
        repo.upsert(&record("10.0.0.1", "a2")).unwrap();

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.upsert_count(), 3);
        assert_eq!(repo.get("10.0.0.1").unwrap().hostname, "a2");

        let all = repo.list_all().unwrap();
        assert_eq!(all[0].address, "10.0.0.1");
        assert_eq!(all[1].address, "10.0.0.2");
    }

    #[test]
    fn test_unavailable_rejects_writes() {
        let repo = MemoryRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.upsert(&record("10.0.0.1", "a")),
            Err(DbError::Unavailable(_))
        ));
        assert!(repo.is_empty());

        repo.set_unavailable(false);
        repo.upsert(&record("10.0.0.1", "a")).unwrap();
        assert_eq!(repo.len(), 1);
    }
}
