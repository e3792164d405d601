//! Cross-module tests for the zone state layer
//!
//! - Orchestrator lifecycle: live-entity sync, write-back, regeneration
//! - Zone transitions: portal lookup, ordering and failure handling

#[cfg(test)]
pub mod orchestrator_test;


use crate::config::{ZoneConfig, ZoneTable};
use crate::live::{EntityFactory, SimEntityFactory};
use crate::orchestrator::{PortalTable, Traveler, ZoneNotifier, ZoneOrchestrator};
use crate::persistence::{MemoryBackend, PersistenceStore};
use crate::types::{PlayerId, Position, ZoneId};
use std::sync::{Arc, Mutex};

/// Notifier capturing every welcome it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub welcomes: Mutex<Vec<(PlayerId, ZoneId, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.welcomes.lock().unwrap().len()
    }
}

impl ZoneNotifier for RecordingNotifier {
    fn zone_welcome(&self, traveler: &Traveler, zone_id: &ZoneId, config: &ZoneConfig) {
        self.welcomes
            .lock()
            .unwrap()
            .push((traveler.id.clone(), zone_id.clone(), config.name.clone()));
    }
}

pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub zones: ZoneOrchestrator,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryBackend::new()), Arc::new(SimEntityFactory::new()))
}

pub fn harness_with(backend: Arc<MemoryBackend>, factory: Arc<dyn EntityFactory>) -> Harness {
    let store = Arc::new(PersistenceStore::new(backend.clone(), Arc::new(ZoneTable::builtin())));
    let notifier = Arc::new(RecordingNotifier::default());
    let zones = ZoneOrchestrator::new(store, PortalTable::builtin(), factory, notifier.clone());
    Harness {
        backend,
        notifier,
        zones,
    }
}

pub fn zone(id: &str) -> ZoneId {
    ZoneId::new(id)
}

/// A traveler bound to the hot zone's player set.
pub fn traveler_in(zones: &mut ZoneOrchestrator, position: Position) -> Traveler {
    let traveler = Traveler::new(PlayerId::new(), position);
    zones
        .hot_zone_mut()
        .unwrap()
        .instance_mut()
        .add_player(traveler.id.clone());
    traveler
}
