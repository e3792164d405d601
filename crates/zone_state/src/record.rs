//! # Object Records
//!
//! An [`ObjectRecord`] is the authoritative, behaviour-free state of one
//! zone-resident object. Records are what gets persisted; live simulation
//! entities are built from them and written back into them.
//!
//! ## Wire format
//!
//! Records serialize to a flat JSON object:
//!
//! ```json
//! { "id": "enemy_3_1712", "type": "enemy", "x": 120.0, "y": 340.5,
//!   "active": true, "createdAt": 1712, "lastModifiedAt": 1712,
//!   "enemyType": "wolf", "level": 2, "lootTable": "rare" }
//! ```
//!
//! The kind-specific keys (`enemyType`, `level`) are parsed into a typed
//! [`RecordPayload`]. Keys this version does not know (`lootTable` above) are
//! kept verbatim in [`ObjectRecord::extra`] and written back on save.

use crate::types::{ObjectId, ObjectKind, Position};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the record header; they can never be overwritten through
/// the open attribute bag.
const RESERVED_KEYS: [&str; 8] = [
    "id",
    "type",
    "kind",
    "x",
    "y",
    "active",
    "createdAt",
    "lastModifiedAt",
];

fn default_level() -> u32 {
    1
}

fn default_value() -> u32 {
    1
}

fn default_remaining() -> u32 {
    3
}

fn default_active() -> bool {
    true
}

/// Hostile unit attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyPayload {
    /// Sub-type selecting the enemy archetype (e.g. `"wolf"`)
    #[serde(default)]
    pub enemy_type: String,
    /// Difficulty level
    #[serde(default = "default_level")]
    pub level: u32,
}

/// Collectible item attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupPayload {
    #[serde(default)]
    pub pickup_type: String,
    /// Stack size or coin value
    #[serde(default = "default_value")]
    pub value: u32,
}

/// Harvestable node attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePayload {
    #[serde(default)]
    pub resource_type: String,
    /// Harvests left before the node is depleted
    #[serde(default = "default_remaining")]
    pub remaining: u32,
}

/// Non-player character attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcPayload {
    #[serde(default)]
    pub npc_type: String,
}

/// Kind-specific part of a record. The variant determines the record's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Enemy(EnemyPayload),
    Pickup(PickupPayload),
    ResourceNode(ResourcePayload),
    Npc(NpcPayload),
}

impl RecordPayload {
    /// Builds the default payload for `kind` with the given sub-type.
    pub fn for_kind(kind: ObjectKind, subtype: impl Into<String>) -> Self {
        let subtype = subtype.into();
        match kind {
            ObjectKind::Enemy => RecordPayload::Enemy(EnemyPayload {
                enemy_type: subtype,
                level: default_level(),
            }),
            ObjectKind::Pickup => RecordPayload::Pickup(PickupPayload {
                pickup_type: subtype,
                value: default_value(),
            }),
            ObjectKind::ResourceNode => RecordPayload::ResourceNode(ResourcePayload {
                resource_type: subtype,
                remaining: default_remaining(),
            }),
            ObjectKind::Npc => RecordPayload::Npc(NpcPayload { npc_type: subtype }),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            RecordPayload::Enemy(_) => ObjectKind::Enemy,
            RecordPayload::Pickup(_) => ObjectKind::Pickup,
            RecordPayload::ResourceNode(_) => ObjectKind::ResourceNode,
            RecordPayload::Npc(_) => ObjectKind::Npc,
        }
    }

    /// The sub-type string of whichever variant this is.
    pub fn subtype(&self) -> &str {
        match self {
            RecordPayload::Enemy(p) => &p.enemy_type,
            RecordPayload::Pickup(p) => &p.pickup_type,
            RecordPayload::ResourceNode(p) => &p.resource_type,
            RecordPayload::Npc(p) => &p.npc_type,
        }
    }

    fn to_attributes(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            RecordPayload::Enemy(p) => serde_json::to_value(p)?,
            RecordPayload::Pickup(p) => serde_json::to_value(p)?,
            RecordPayload::ResourceNode(p) => serde_json::to_value(p)?,
            RecordPayload::Npc(p) => serde_json::to_value(p)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Splits an attribute bag into the typed payload for `kind` and the
    /// attributes that payload does not claim.
    fn from_attributes(
        kind: ObjectKind,
        attributes: Map<String, Value>,
    ) -> Result<(Self, Map<String, Value>), serde_json::Error> {
        fn split<P: DeserializeOwned>(
            attributes: &Map<String, Value>,
        ) -> Result<P, serde_json::Error> {
            serde_json::from_value(Value::Object(attributes.clone()))
        }

        let payload = match kind {
            ObjectKind::Enemy => RecordPayload::Enemy(split(&attributes)?),
            ObjectKind::Pickup => RecordPayload::Pickup(split(&attributes)?),
            ObjectKind::ResourceNode => RecordPayload::ResourceNode(split(&attributes)?),
            ObjectKind::Npc => RecordPayload::Npc(split(&attributes)?),
        };

        let mut extra = attributes;
        for key in payload.to_attributes()?.keys() {
            extra.remove(key);
        }
        Ok((payload, extra))
    }
}

/// The serialized shape of a record: fixed header plus flat attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    id: ObjectId,
    #[serde(rename = "type", alias = "kind")]
    kind: ObjectKind,
    x: f64,
    y: f64,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    last_modified_at: u64,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

/// Authoritative, serializable state of one zone-resident object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", into = "RawRecord")]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub position: Position,
    /// `false` means logically removed but not yet purged
    pub active: bool,
    pub created_at: u64,
    pub last_modified_at: u64,
    pub payload: RecordPayload,
    /// Attributes this version does not model, preserved verbatim
    pub extra: Map<String, Value>,
}

impl ObjectRecord {
    /// Creates an active record stamped with `now` for both timestamps.
    pub fn new(id: ObjectId, payload: RecordPayload, position: Position, now: u64) -> Self {
        Self {
            id,
            position,
            active: true,
            created_at: now,
            last_modified_at: now,
            payload,
            extra: Map::new(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }

    /// Merges `patch` into the record and stamps `last_modified_at`.
    ///
    /// Returns `false` without touching the record when the patch carries a
    /// payload of a different kind; the kind of a record is immutable.
    pub fn apply(&mut self, patch: RecordPatch, now: u64) -> bool {
        if let Some(payload) = &patch.payload {
            if payload.kind() != self.kind() {
                return false;
            }
        }

        if let Some(x) = patch.x {
            self.position.x = x;
        }
        if let Some(y) = patch.y {
            self.position.y = y;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(payload) = patch.payload {
            self.payload = payload;
        }
        for (key, value) in patch.extra {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                self.extra.insert(key, value);
            }
        }

        self.last_modified_at = now.max(self.last_modified_at).max(self.created_at);
        true
    }
}

impl TryFrom<RawRecord> for ObjectRecord {
    type Error = serde_json::Error;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let (payload, extra) = RecordPayload::from_attributes(raw.kind, raw.attributes)?;
        Ok(Self {
            id: raw.id,
            position: Position::new(raw.x, raw.y),
            active: raw.active,
            created_at: raw.created_at,
            last_modified_at: raw.last_modified_at.max(raw.created_at),
            payload,
            extra,
        })
    }
}

impl From<ObjectRecord> for RawRecord {
    fn from(record: ObjectRecord) -> Self {
        let mut attributes = record.extra;
        // Payload structs always serialize to an object; typed keys win over
        // stale copies in the bag.
        if let Ok(typed) = record.payload.to_attributes() {
            attributes.extend(typed);
        }
        Self {
            id: record.id,
            kind: record.payload.kind(),
            x: record.position.x,
            y: record.position.y,
            active: record.active,
            created_at: record.created_at,
            last_modified_at: record.last_modified_at,
            attributes,
        }
    }
}

/// Partial update applied through [`crate::ZoneInstance::update`].
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub active: Option<bool>,
    /// Replacement payload; must be of the record's kind
    pub payload: Option<RecordPayload>,
    /// Open attributes merged into [`ObjectRecord::extra`]
    pub extra: Map<String, Value>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Position) -> Self {
        self.x = Some(position.x);
        self.y = Some(position.y);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn payload(mut self, payload: RecordPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
