//! # Zone Orchestrator
//!
//! Keeps the cold, authoritative records of the hot zone in sync with the
//! live simulation entities built from them, and moves travelers between
//! zones through portals.
//!
//! ## States
//!
//! The orchestrator is either idle (no zone loaded) or holds exactly one
//! [`HotZone`]: the zone's [`ZoneInstance`] plus the [`ObjectRegistry`] of
//! its live entities. Entering another zone tears the previous registry
//! down before the new one is built.
//!
//! ## Write-back
//!
//! Gameplay mutates live entities only. [`ZoneOrchestrator::leave_zone`]
//! (and [`ZoneOrchestrator::autosave`]) copy every live entity's position
//! and liveness back into its record before the instance is persisted.
//!
//! ## Transition ordering
//!
//! [`ZoneOrchestrator::change_zone`] obtains the destination instance before
//! touching the source. Any failure up to the point where the source is
//! persisted without the traveler leaves the traveler in the source zone.

pub mod notify;
pub mod portals;

pub use notify::{LogNotifier, ZoneNotifier};
pub use portals::{Portal, PortalTable};

use crate::config::ZoneTable;
use crate::instance::ZoneInstance;
use crate::live::{EntityFactory, SimEntityFactory};
use crate::persistence::{PersistenceError, PersistenceStats, PersistenceStore};
use crate::record::RecordPatch;
use crate::registry::ObjectRegistry;
use crate::types::{ObjectKind, PlayerId, Position, ZoneId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors surfaced by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("No zone is loaded")]
    NoZoneLoaded,
    #[error("No portal leads from {from} to {to}")]
    NoTransition { from: ZoneId, to: ZoneId },
    #[error("Traveler is already in zone {0}")]
    AlreadyInZone(ZoneId),
    #[error("Zone {0} is not the hot zone")]
    NotHot(ZoneId),
    #[error("Failed to persist zone {0}")]
    SaveFailed(ZoneId),
    #[error("Failed to clear the persistence store")]
    ClearFailed,
}

/// The player moving between zones.
#[derive(Debug, Clone, PartialEq)]
pub struct Traveler {
    pub id: PlayerId,
    pub position: Position,
}

impl Traveler {
    pub fn new(id: PlayerId, position: Position) -> Self {
        Self { id, position }
    }
}

/// The currently loaded zone: records plus their live counterparts.
#[derive(Debug)]
pub struct HotZone {
    instance: ZoneInstance,
    registry: ObjectRegistry,
}

impl HotZone {
    pub fn zone_id(&self) -> &ZoneId {
        self.instance.zone_id()
    }

    pub fn instance(&self) -> &ZoneInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut ZoneInstance {
        &mut self.instance
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    /// Copies live position and liveness into the records. Entities whose
    /// state already matches their record are skipped so their
    /// `lastModifiedAt` stays put. Returns the number of records updated.
    fn write_back(&mut self) -> usize {
        let mut written = 0;
        for (id, entry) in self.registry.iter() {
            let position = entry.handle().position();
            let alive = entry.handle().is_alive();
            let unchanged = match self.instance.get(id) {
                Some(record) => record.position == position && record.active == alive,
                None => {
                    debug!("Live entity {} has no record in zone {}", id, self.instance.zone_id());
                    continue;
                }
            };
            if !unchanged && self.instance.update(id, RecordPatch::new().position(position).active(alive)) {
                written += 1;
            }
        }
        written
    }

    /// Rebuilds the registry from the active records.
    fn spawn_live(&mut self, factory: &dyn EntityFactory) -> usize {
        self.registry.clear();
        for record in self.instance.active_records() {
            if !factory.supports(record.kind()) {
                continue;
            }
            match factory.spawn(record) {
                Ok(handle) => self.registry.register(record.id.clone(), handle),
                Err(e) => warn!(
                    "Skipping record {} in zone {}: {}",
                    record.id,
                    self.instance.zone_id(),
                    e
                ),
            }
        }
        self.registry.len()
    }
}

/// Aggregate view for operators.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub current_zone: Option<ZoneId>,
    pub live_entities: usize,
    pub live_by_kind: BTreeMap<ObjectKind, usize>,
    pub persistence: PersistenceStats,
}

/// Bridges zone records, live entities and persistence.
pub struct ZoneOrchestrator {
    persistence: Arc<PersistenceStore>,
    table: Arc<ZoneTable>,
    portals: PortalTable,
    factory: Arc<dyn EntityFactory>,
    notifier: Arc<dyn ZoneNotifier>,
    hot: Option<HotZone>,
}

impl std::fmt::Debug for ZoneOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneOrchestrator")
            .field("current_zone", &self.current_zone())
            .field("portals", &self.portals.len())
            .field("live_entities", &self.hot.as_ref().map_or(0, |hot| hot.registry.len()))
            .finish()
    }
}

impl ZoneOrchestrator {
    pub fn new(
        persistence: Arc<PersistenceStore>,
        portals: PortalTable,
        factory: Arc<dyn EntityFactory>,
        notifier: Arc<dyn ZoneNotifier>,
    ) -> Self {
        let table = persistence.table().clone();
        Self {
            persistence,
            table,
            portals,
            factory,
            notifier,
            hot: None,
        }
    }

    /// Built-in portals, [`SimEntityFactory`] and [`LogNotifier`].
    pub fn with_defaults(persistence: Arc<PersistenceStore>) -> Self {
        Self::new(
            persistence,
            PortalTable::builtin(),
            Arc::new(SimEntityFactory::new()),
            Arc::new(LogNotifier),
        )
    }

    /// Loads `zone_id` and makes it the hot zone.
    ///
    /// On error the previous hot zone is left intact. Unsaved changes of the
    /// previous hot zone are discarded; call [`leave_zone`](Self::leave_zone)
    /// first to keep them.
    pub fn enter_zone(&mut self, zone_id: &ZoneId) -> Result<(), ZoneError> {
        let instance = self.load_instance(zone_id)?;
        let spawned = self.activate(instance);
        info!("🗺️ Entered zone {} ({} live entities)", zone_id, spawned);
        Ok(())
    }

    /// Writes live state back into the hot zone's records and persists it.
    ///
    /// Returns the save result, `false` when no zone is loaded.
    pub fn leave_zone(&mut self) -> bool {
        let Some(hot) = self.hot.as_mut() else {
            return false;
        };
        let written = hot.write_back();
        debug!("✍️ Wrote back {} live entities in zone {}", written, hot.zone_id());
        self.persistence.save(hot.zone_id(), &hot.instance)
    }

    /// Persists the hot zone without changing zones.
    pub fn autosave(&mut self) -> bool {
        self.leave_zone()
    }

    /// Moves `traveler` from the hot zone to `target` through the first
    /// portal linking them.
    ///
    /// On success the traveler stands at the portal's entry point in the
    /// new hot zone and a welcome notification has been emitted. On error
    /// the traveler is still bound to the source zone. A target equal to
    /// the hot zone is refused with [`ZoneError::AlreadyInZone`].
    pub fn change_zone(&mut self, target: &ZoneId, traveler: &mut Traveler) -> Result<(), ZoneError> {
        let source = self.current_zone().cloned().ok_or(ZoneError::NoZoneLoaded)?;
        if *target == source {
            return Err(ZoneError::AlreadyInZone(source));
        }
        let portal = self
            .portals
            .first_to(&source, target)
            .cloned()
            .ok_or_else(|| ZoneError::NoTransition {
                from: source.clone(),
                to: target.clone(),
            })?;

        let Some(hot) = self.hot.as_mut() else {
            return Err(ZoneError::NoZoneLoaded);
        };
        hot.write_back();

        let mut destination = match self.load_instance(target) {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Cannot load zone {}, {} stays in {}: {}", target, traveler.id, source, e);
                if !self.leave_zone() {
                    warn!("Failed to persist zone {} after aborted transition", source);
                }
                return Err(e);
            }
        };

        if let Some(hot) = self.hot.as_mut() {
            let was_present = hot.instance.remove_player(&traveler.id);
            if !self.persistence.save(&source, &hot.instance) {
                if was_present {
                    hot.instance.add_player(traveler.id.clone());
                }
                return Err(ZoneError::SaveFailed(source));
            }
        }

        traveler.position = portal.entry();
        destination.add_player(traveler.id.clone());
        self.activate(destination);

        if let Some(hot) = self.hot.as_ref() {
            if !self.persistence.save(target, &hot.instance) {
                warn!("Failed to persist zone {} on arrival, will retry on autosave", target);
            }
            self.notifier.zone_welcome(traveler, target, hot.instance.config());
        }

        info!("🚪 Player {} moved {} -> {}", traveler.id, source, target);
        Ok(())
    }

    /// Portal of the hot zone whose radius contains `position`.
    pub fn portal_at(&self, position: Position) -> Option<&Portal> {
        let zone_id = self.current_zone()?;
        self.portals.at(zone_id, position)
    }

    /// Discards and regenerates the records of the hot zone, rebuilds its
    /// live entities and persists it. Returns the number of live entities.
    pub fn regenerate(&mut self, zone_id: &ZoneId) -> Result<usize, ZoneError> {
        let hot = match self.hot.as_mut() {
            Some(hot) if hot.zone_id() == zone_id => hot,
            _ => return Err(ZoneError::NotHot(zone_id.clone())),
        };

        hot.instance.clear_objects();
        hot.instance.populate();
        let spawned = hot.spawn_live(self.factory.as_ref());
        info!("🔄 Regenerated zone {} ({} live entities)", zone_id, spawned);

        if !self.persistence.save(zone_id, &hot.instance) {
            return Err(ZoneError::SaveFailed(zone_id.clone()));
        }
        Ok(spawned)
    }

    /// Wipes the persistence store and reloads the hot zone from scratch,
    /// keeping its players.
    pub fn force_regenerate_all(&mut self) -> Result<(), ZoneError> {
        if !self.persistence.clear_all() {
            return Err(ZoneError::ClearFailed);
        }

        let Some(previous) = self.hot.as_ref() else {
            info!("🔄 Persistence cleared, no zone loaded");
            return Ok(());
        };
        let zone_id = previous.zone_id().clone();
        let players: Vec<PlayerId> = previous.instance.players().iter().cloned().collect();

        let mut fresh = self.load_instance(&zone_id)?;
        for player in players {
            fresh.add_player(player);
        }
        let spawned = self.activate(fresh);
        info!("🔄 Regenerated all zones, reloaded {} ({} live entities)", zone_id, spawned);

        if !self.autosave() {
            return Err(ZoneError::SaveFailed(zone_id));
        }
        Ok(())
    }

    pub fn current_zone(&self) -> Option<&ZoneId> {
        self.hot.as_ref().map(HotZone::zone_id)
    }

    pub fn hot_zone(&self) -> Option<&HotZone> {
        self.hot.as_ref()
    }

    pub fn hot_zone_mut(&mut self) -> Option<&mut HotZone> {
        self.hot.as_mut()
    }

    pub fn instance(&self) -> Option<&ZoneInstance> {
        self.hot.as_ref().map(HotZone::instance)
    }

    pub fn registry(&self) -> Option<&ObjectRegistry> {
        self.hot.as_ref().map(HotZone::registry)
    }

    pub fn registry_mut(&mut self) -> Option<&mut ObjectRegistry> {
        self.hot.as_mut().map(HotZone::registry_mut)
    }

    pub fn persistence(&self) -> &Arc<PersistenceStore> {
        &self.persistence
    }

    pub fn portals(&self) -> &PortalTable {
        &self.portals
    }

    pub fn table(&self) -> &ZoneTable {
        &self.table
    }

    pub fn system_stats(&self) -> SystemStats {
        let (live_entities, live_by_kind) = match self.hot.as_ref() {
            Some(hot) => (hot.registry.len(), hot.registry.kind_counts().into_iter().collect()),
            None => (0, BTreeMap::new()),
        };
        SystemStats {
            current_zone: self.current_zone().cloned(),
            live_entities,
            live_by_kind,
            persistence: self.persistence.stats(),
        }
    }

    /// Fetches `zone_id` from the store and migrates outdated content.
    fn load_instance(&self, zone_id: &ZoneId) -> Result<ZoneInstance, ZoneError> {
        let mut instance = self.persistence.get_or_create(zone_id)?;
        if instance.needs_migration() {
            info!(
                "🧬 Zone {} was generated by an older config schema, regenerating",
                zone_id
            );
            instance.set_config(self.table.config_for(zone_id));
            instance.clear_objects();
            instance.populate();
        }
        Ok(instance)
    }

    /// Tears down the current hot zone and makes `instance` hot.
    fn activate(&mut self, instance: ZoneInstance) -> usize {
        if let Some(mut previous) = self.hot.take() {
            previous.registry.clear();
            debug!("Tore down zone {}", previous.zone_id());
        }

        let mut hot = HotZone {
            instance,
            registry: ObjectRegistry::new(),
        };
        let spawned = hot.spawn_live(self.factory.as_ref());
        self.hot = Some(hot);
        spawned
    }
}
