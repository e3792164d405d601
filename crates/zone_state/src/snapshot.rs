//! Persisted form of a zone instance.

use crate::config::ZoneConfig;
use crate::record::ObjectRecord;
use crate::types::{InstanceId, ObjectId, PlayerId, ZoneId};
use serde::{Deserialize, Serialize};

/// Serialized zone instance as written to the durable store.
///
/// `objects` is an ordered list of `[id, record]` pairs. `config` and
/// `savedAt` are absent in snapshots written before they existed; a missing
/// config marks the instance for migration on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSnapshot {
    pub zone_id: ZoneId,
    #[serde(default)]
    pub instance_id: InstanceId,
    #[serde(default)]
    pub last_update: u64,
    #[serde(default)]
    pub objects: Vec<(ObjectId, ObjectRecord)>,
    #[serde(default)]
    pub players: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ZoneConfig>,
    /// When the persistence store last wrote this snapshot (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<u64>,
}

impl ZoneSnapshot {
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn active_count(&self) -> usize {
        self.objects.iter().filter(|(_, record)| record.active).count()
    }

    /// Save time, falling back to the last mutation for unstamped snapshots.
    pub fn effective_saved_at(&self) -> u64 {
        self.saved_at.unwrap_or(self.last_update)
    }
}
