//! # Zone State
//!
//! Authoritative zone state for the zone server: which objects exist in each
//! zone, where they are, whether they are still active and when they last
//! changed, plus the machinery that keeps that state alive across visits.
//!
//! ## Core Features
//!
//! - **Stable Identity**: every object record carries a unique id and
//!   `createdAt`/`lastModifiedAt` timestamps, so clients only need deltas
//! - **Persistent Zones**: zone instances outlive a player's visit through a
//!   pluggable snapshot store (JSON directory or in-memory)
//! - **Live Synchronization**: records of the hot zone are turned into live
//!   simulation entities and written back before every save
//! - **Portals**: player transitions between zones with a strict ordering
//!   that never leaves a traveler in two zones
//!
//! ## Architecture Overview
//!
//! - [`registry`]: id → live entity index of the hot zone, with kind and
//!   modification-time queries
//! - [`instance`]: the record set of one zone (generation, CRUD, snapshots)
//! - [`persistence`]: durable `zone id → snapshot` store
//! - [`orchestrator`]: hot-zone lifecycle, write-back, portals, regeneration
//! - [`config`]: zone generation table
//! - [`live`]: the contract live simulation objects implement
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zone_state::*;
//!
//! let table = Arc::new(ZoneTable::builtin());
//! let backend = Arc::new(JsonDirBackend::new("zones"));
//! let store = Arc::new(PersistenceStore::new(backend, table));
//!
//! let mut zones = ZoneOrchestrator::with_defaults(store);
//! zones.enter_zone(&ZoneId::new("town"))?;
//!
//! let mut traveler = Traveler::new(PlayerId::new(), Position::new(1150.0, 450.0));
//! zones.change_zone(&ZoneId::new("forest"), &mut traveler)?;
//! zones.autosave();
//! # Ok::<(), ZoneError>(())
//! ```

pub mod config;
pub mod instance;
pub mod live;
pub mod orchestrator;
pub mod persistence;
pub mod record;
pub mod registry;
pub mod snapshot;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::{
    ConfigError, Landmark, PopulationSpec, SubtypeSelector, WeightedSubtype, ZoneConfig, ZoneTable,
    CONFIG_VERSION, MAX_POPULATION,
};
pub use instance::ZoneInstance;
pub use live::{EntityFactory, LiveEntity, SimEntity, SimEntityFactory, SpawnError};
pub use orchestrator::{
    HotZone, LogNotifier, Portal, PortalTable, SystemStats, Traveler, ZoneError, ZoneNotifier,
    ZoneOrchestrator,
};
pub use persistence::{
    JsonDirBackend, MemoryBackend, PersistenceError, PersistenceStats, PersistenceStore,
    SnapshotBackend, ZoneStats,
};
pub use record::{
    EnemyPayload, NpcPayload, ObjectRecord, PickupPayload, RecordPatch, RecordPayload,
    ResourcePayload,
};
pub use registry::{IdGenerator, ObjectRegistry, RegistryEntry};
pub use snapshot::ZoneSnapshot;
pub use types::*;
pub use utils::current_timestamp_ms;
