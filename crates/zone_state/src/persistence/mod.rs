//! # Persistence Store
//!
//! Durable mapping `zone id → snapshot` that makes zone state outlive a
//! player's visit. The store keeps an in-memory index of every snapshot and
//! writes through to a [`SnapshotBackend`] on each save.
//!
//! ## Failure model
//!
//! Backend failures never propagate as panics. Loading a corrupt or
//! unreadable backend yields an empty index; failed saves and evictions
//! report `false` and leave the index exactly as it was. Only
//! [`PersistenceStore::get_or_create`] surfaces an error, for a stored
//! snapshot that cannot be turned back into an instance.
//!
//! ## Concurrency
//!
//! The store is `Send + Sync` and meant to be shared behind an `Arc`. Writes
//! to the same zone are serialized by a per-zone lock; distinct zones save
//! in parallel.

pub mod backend;
pub mod json_dir;

pub use backend::{MemoryBackend, SnapshotBackend};
pub use json_dir::JsonDirBackend;

use crate::config::ZoneTable;
use crate::instance::ZoneInstance;
use crate::snapshot::ZoneSnapshot;
use crate::types::{InstanceId, ObjectKind, ZoneId};
use crate::utils::current_timestamp_ms;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors raised by snapshot backends.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt snapshot for {zone}: {reason}")]
    Corrupt { zone: String, reason: String },
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Per-zone entry of [`PersistenceStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStats {
    pub zone_id: ZoneId,
    pub instance_id: InstanceId,
    pub object_count: usize,
    pub active_objects: usize,
    pub objects_by_kind: BTreeMap<ObjectKind, usize>,
    pub player_count: usize,
    pub last_update: u64,
    pub saved_at: Option<u64>,
}

/// Summary of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistenceStats {
    pub zone_count: usize,
    pub total_objects: usize,
    pub zones: Vec<ZoneStats>,
}

/// Durable zone snapshot store.
#[derive(Debug)]
pub struct PersistenceStore {
    backend: Arc<dyn SnapshotBackend>,
    table: Arc<ZoneTable>,
    instance_id: InstanceId,
    /// Last successfully written snapshot per zone
    index: DashMap<ZoneId, ZoneSnapshot>,
    /// Serializes writes per zone
    write_locks: DashMap<ZoneId, Arc<Mutex<()>>>,
}

impl PersistenceStore {
    /// Creates the store and loads every snapshot the backend holds.
    pub fn new(backend: Arc<dyn SnapshotBackend>, table: Arc<ZoneTable>) -> Self {
        Self::with_instance_id(backend, table, InstanceId::default())
    }

    /// Like [`PersistenceStore::new`]; freshly created instances get
    /// `instance_id`.
    pub fn with_instance_id(
        backend: Arc<dyn SnapshotBackend>,
        table: Arc<ZoneTable>,
        instance_id: InstanceId,
    ) -> Self {
        let store = Self {
            backend,
            table,
            instance_id,
            index: DashMap::new(),
            write_locks: DashMap::new(),
        };
        store.load();
        store
    }

    pub fn table(&self) -> &Arc<ZoneTable> {
        &self.table
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Replaces the index with the backend's content.
    ///
    /// Returns the number of zones loaded. Any failure empties the index.
    pub fn load(&self) -> usize {
        match self.backend.load_all() {
            Ok(snapshots) => {
                let mut loaded: HashMap<ZoneId, ZoneSnapshot> = HashMap::with_capacity(snapshots.len());
                for snapshot in snapshots {
                    if let Some(previous) = loaded.insert(snapshot.zone_id.clone(), snapshot) {
                        warn!("Duplicate snapshot for zone {} in {}", previous.zone_id, self.backend.describe());
                    }
                }

                self.index.clear();
                let count = loaded.len();
                for (zone_id, snapshot) in loaded {
                    self.index.insert(zone_id, snapshot);
                }
                info!("📦 Loaded {} zone snapshots from {}", count, self.backend.describe());
                count
            }
            Err(e) => {
                warn!(
                    "Failed to load zone snapshots from {}, starting empty: {}",
                    self.backend.describe(),
                    e
                );
                self.index.clear();
                0
            }
        }
    }

    /// Returns the stored instance of `zone_id`, or a freshly generated one.
    ///
    /// Fresh instances are not persisted until the first [`save`](Self::save).
    pub fn get_or_create(&self, zone_id: &ZoneId) -> Result<ZoneInstance, PersistenceError> {
        let stored = self.index.get(zone_id).map(|entry| entry.value().clone());
        let Some(snapshot) = stored else {
            debug!("🌱 No snapshot for zone {}, generating", zone_id);
            return Ok(ZoneInstance::new(zone_id.clone(), self.instance_id.clone(), &self.table));
        };

        if snapshot.zone_id != *zone_id {
            return Err(PersistenceError::Corrupt {
                zone: zone_id.to_string(),
                reason: format!("snapshot belongs to zone {}", snapshot.zone_id),
            });
        }
        if let Some(config) = &snapshot.config {
            config.validate().map_err(|reason| PersistenceError::Corrupt {
                zone: zone_id.to_string(),
                reason,
            })?;
        }

        Ok(ZoneInstance::deserialize(snapshot, &self.table))
    }

    /// Persists `instance` under `zone_id`.
    ///
    /// Stamps `savedAt`, writes to the backend and only then updates the
    /// index. Returns `false` on backend failure.
    pub fn save(&self, zone_id: &ZoneId, instance: &ZoneInstance) -> bool {
        let lock = self.zone_lock(zone_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut snapshot = instance.serialize();
        if snapshot.zone_id != *zone_id {
            warn!("Saving instance of zone {} under {}", snapshot.zone_id, zone_id);
            snapshot.zone_id = zone_id.clone();
        }
        snapshot.saved_at = Some(current_timestamp_ms());

        if let Err(e) = self.backend.write(&snapshot) {
            warn!("Failed to save zone {}: {}", zone_id, e);
            return false;
        }

        debug!("💾 Saved zone {} ({} objects)", zone_id, snapshot.object_count());
        self.index.insert(zone_id.clone(), snapshot);
        true
    }

    pub fn contains(&self, zone_id: &ZoneId) -> bool {
        self.index.contains_key(zone_id)
    }

    /// Copy of the stored snapshot of `zone_id`.
    pub fn snapshot(&self, zone_id: &ZoneId) -> Option<ZoneSnapshot> {
        self.index.get(zone_id).map(|entry| entry.value().clone())
    }

    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut ids: Vec<ZoneId> = self.index.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Deletes the snapshot of `zone_id`; `false` when absent or the backend
    /// refuses.
    pub fn remove(&self, zone_id: &ZoneId) -> bool {
        if !self.index.contains_key(zone_id) {
            return false;
        }

        let lock = self.zone_lock(zone_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = self.backend.remove(zone_id) {
            warn!("Failed to remove zone {}: {}", zone_id, e);
            return false;
        }
        self.index.remove(zone_id).is_some()
    }

    /// Removes every snapshot saved at least `max_age` ago.
    ///
    /// `Duration::ZERO` evicts everything. Returns whether anything was
    /// evicted; zones the backend refuses to delete stay indexed.
    pub fn evict_older_than(&self, max_age: Duration) -> bool {
        let now = current_timestamp_ms();
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);

        let stale: Vec<ZoneId> = self
            .index
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().effective_saved_at()) >= max_age_ms)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for zone_id in &stale {
            if self.remove(zone_id) {
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!("🗑️ Evicted {} zone snapshots older than {:?}", evicted, max_age);
        }
        evicted > 0
    }

    /// Wipes the backend, then the index. `false` leaves both untouched.
    pub fn clear_all(&self) -> bool {
        if let Err(e) = self.backend.clear() {
            warn!("Failed to clear zone snapshots: {}", e);
            return false;
        }
        let dropped = self.index.len();
        self.index.clear();
        info!("🧹 Cleared {} zone snapshots", dropped);
        true
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> PersistenceStats {
        let mut zones: Vec<ZoneStats> = self
            .index
            .iter()
            .map(|entry| {
                let snapshot = entry.value();
                let mut objects_by_kind = BTreeMap::new();
                for (_, record) in &snapshot.objects {
                    *objects_by_kind.entry(record.kind()).or_insert(0) += 1;
                }
                ZoneStats {
                    zone_id: snapshot.zone_id.clone(),
                    instance_id: snapshot.instance_id.clone(),
                    object_count: snapshot.object_count(),
                    active_objects: snapshot.active_count(),
                    objects_by_kind,
                    player_count: snapshot.players.len(),
                    last_update: snapshot.last_update,
                    saved_at: snapshot.saved_at,
                }
            })
            .collect();
        zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));

        PersistenceStats {
            zone_count: zones.len(),
            total_objects: zones.iter().map(|z| z.object_count).sum(),
            zones,
        }
    }

    fn zone_lock(&self, zone_id: &ZoneId) -> Arc<Mutex<()>> {
        self.write_locks.entry(zone_id.clone()).or_default().value().clone()
    }
}
