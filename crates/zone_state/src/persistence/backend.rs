//! Durable media behind the persistence store.

use super::PersistenceError;
use crate::snapshot::ZoneSnapshot;
use crate::types::ZoneId;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Trait implemented by every durable store of zone snapshots.
///
/// Implementations must make `write` all-or-nothing for a single zone: a
/// failed write leaves the previous snapshot of that zone readable.
pub trait SnapshotBackend: Send + Sync + Debug {
    /// Reads every stored snapshot. Any unreadable entry fails the whole load.
    fn load_all(&self) -> Result<Vec<ZoneSnapshot>, PersistenceError>;

    /// Writes (or replaces) the snapshot of `snapshot.zone_id`.
    fn write(&self, snapshot: &ZoneSnapshot) -> Result<(), PersistenceError>;

    /// Deletes the snapshot of `zone_id`; absent zones are not an error.
    fn remove(&self, zone_id: &ZoneId) -> Result<(), PersistenceError>;

    /// Deletes every snapshot.
    fn clear(&self) -> Result<(), PersistenceError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// In-memory backend holding serialized JSON documents.
///
/// Used for ephemeral servers and tests; reads and writes can be switched to
/// fail to exercise the store's degradation paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<BTreeMap<ZoneId, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw document, bypassing serialization.
    pub fn insert_raw(&self, zone_id: impl Into<ZoneId>, document: impl Into<String>) {
        self.lock().insert(zone_id.into(), document.into());
    }

    pub fn raw(&self, zone_id: &ZoneId) -> Option<String> {
        self.lock().get(zone_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ZoneId, String>> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(PersistenceError::Unavailable("memory backend is read-only".to_string()));
        }
        Ok(())
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load_all(&self) -> Result<Vec<ZoneSnapshot>, PersistenceError> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(PersistenceError::Unavailable("memory backend is unreadable".to_string()));
        }

        self.lock()
            .iter()
            .map(|(zone_id, document)| {
                serde_json::from_str(document).map_err(|e| PersistenceError::Corrupt {
                    zone: zone_id.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn write(&self, snapshot: &ZoneSnapshot) -> Result<(), PersistenceError> {
        self.check_writable()?;
        let document = serde_json::to_string(snapshot)?;
        self.lock().insert(snapshot.zone_id.clone(), document);
        Ok(())
    }

    fn remove(&self, zone_id: &ZoneId) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.lock().remove(zone_id);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.lock().clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
