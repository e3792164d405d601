use super::*;
use crate::instance::ZoneInstance;
use crate::live::{LiveEntity, SimEntity};
use crate::orchestrator::ZoneError;
use crate::record::{ObjectRecord, RecordPayload};
use crate::types::{InstanceId, ObjectId, ObjectKind};
use crate::utils::current_timestamp_ms;
use crate::persistence::SnapshotBackend;
use crate::snapshot::ZoneSnapshot;
use crate::CONFIG_VERSION;
use std::collections::HashSet;

fn despawn(zones: &mut ZoneOrchestrator, id: &ObjectId) {
    let entity = zones.registry_mut().unwrap().get_mut(id).unwrap();
    entity.as_any_mut().downcast_mut::<SimEntity>().unwrap().despawn();
}

fn seed(backend: &MemoryBackend, instance: &ZoneInstance, edit: impl FnOnce(&mut ZoneSnapshot)) {
    let mut snapshot = instance.serialize();
    edit(&mut snapshot);
    backend.write(&snapshot).unwrap();
}

#[test]
fn test_enter_zone_spawns_every_active_record() {
    let mut h = harness();
    h.zones.enter_zone(&zone("forest")).unwrap();

    let hot = h.zones.hot_zone().unwrap();
    assert_eq!(hot.zone_id(), &zone("forest"));
    assert_eq!(hot.registry().len(), 19);
    assert_eq!(hot.registry().by_kind(ObjectKind::Enemy).len(), 8);
    for (id, entry) in hot.registry().iter() {
        let record = hot.instance().get(id).unwrap();
        assert_eq!(entry.handle().position(), record.position);
        assert_eq!(entry.created_at(), record.created_at);
    }
}

#[test]
fn test_factory_kinds_limit_live_entities() {
    let h = harness_with(
        Arc::new(MemoryBackend::new()),
        Arc::new(SimEntityFactory::with_kinds([ObjectKind::Enemy])),
    );
    let mut zones = h.zones;
    zones.enter_zone(&zone("caves")).unwrap();

    let registry = zones.registry().unwrap();
    assert_eq!(registry.len(), 10);
    assert_eq!(zones.instance().unwrap().len(), 18);
}

#[test]
fn test_spawn_failure_skips_only_that_record() {
    let backend = Arc::new(MemoryBackend::new());
    let mut forest = ZoneInstance::new(zone("forest"), InstanceId::default(), &ZoneTable::builtin());
    let broken = ObjectId::new("enemy_broken");
    assert!(forest.insert(ObjectRecord::new(
        broken.clone(),
        RecordPayload::for_kind(ObjectKind::Enemy, ""),
        Position::new(500.0, 500.0),
        current_timestamp_ms(),
    )));
    seed(&backend, &forest, |_| {});

    let mut h = harness_with(backend, Arc::new(SimEntityFactory::new()));
    h.zones.enter_zone(&zone("forest")).unwrap();

    let hot = h.zones.hot_zone().unwrap();
    assert_eq!(hot.instance().len(), 20);
    assert_eq!(hot.registry().len(), 19);
    assert!(!hot.registry().contains(&broken));
    assert!(hot.instance().get(&broken).is_some());
}

#[test]
fn test_autosave_writes_back_live_state() {
    let mut h = harness();
    h.zones.enter_zone(&zone("forest")).unwrap();

    let ids: Vec<ObjectId> = h
        .zones
        .registry()
        .unwrap()
        .by_kind(ObjectKind::Enemy)
        .iter()
        .map(|e| e.id().clone())
        .collect();
    let (moved, killed) = (&ids[0], &ids[1]);

    h.zones
        .registry_mut()
        .unwrap()
        .get_mut(moved)
        .unwrap()
        .set_position(Position::new(123.0, 456.0));
    despawn(&mut h.zones, killed);

    assert!(h.zones.autosave());

    let store = h.zones.persistence().clone();
    let stored = store.get_or_create(&zone("forest")).unwrap();
    assert_eq!(stored.get(moved).unwrap().position, Position::new(123.0, 456.0));
    assert!(stored.get(moved).unwrap().active);
    assert!(!stored.get(killed).unwrap().active);

    let untouched = &ids[2];
    let record = stored.get(untouched).unwrap();
    assert_eq!(record.created_at, record.last_modified_at);
}

#[test]
fn test_leave_zone_without_hot_zone() {
    let mut h = harness();
    assert!(!h.zones.leave_zone());
    assert!(!h.zones.autosave());
    assert!(h.zones.current_zone().is_none());
    assert!(h.backend.is_empty());
}

#[test]
fn test_autosave_failure_is_reported() {
    let mut h = harness();
    h.zones.enter_zone(&zone("town")).unwrap();
    h.backend.set_fail_writes(true);

    assert!(!h.zones.autosave());
    assert_eq!(h.zones.current_zone(), Some(&zone("town")));
    assert!(!h.zones.persistence().contains(&zone("town")));
}

#[test]
fn test_outdated_snapshot_is_regenerated_on_entry() {
    let backend = Arc::new(MemoryBackend::new());
    let table = ZoneTable::builtin();
    let mut legacy = ZoneInstance::new(zone("mountains"), InstanceId::default(), &table);
    let marker = ObjectId::new("legacy_npc");
    legacy.insert(ObjectRecord::new(
        marker.clone(),
        RecordPayload::for_kind(ObjectKind::Npc, "hermit"),
        Position::new(300.0, 300.0),
        current_timestamp_ms(),
    ));
    seed(&backend, &legacy, |snapshot| snapshot.config = None);

    let mut h = harness_with(backend, Arc::new(SimEntityFactory::new()));
    h.zones.enter_zone(&zone("mountains")).unwrap();

    let instance = h.zones.instance().unwrap();
    assert!(!instance.needs_migration());
    assert_eq!(instance.config().config_version, CONFIG_VERSION);
    assert!(instance.get(&marker).is_none());
    assert_eq!(instance.len(), 12);
}

#[test]
fn test_current_snapshot_is_restored_as_is() {
    let mut h = harness();
    h.zones.enter_zone(&zone("caves")).unwrap();
    assert!(h.zones.autosave());
    let before: HashSet<ObjectId> = h.zones.instance().unwrap().objects().keys().cloned().collect();

    h.zones.enter_zone(&zone("town")).unwrap();
    h.zones.enter_zone(&zone("caves")).unwrap();
    let after: HashSet<ObjectId> = h.zones.instance().unwrap().objects().keys().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn test_regenerate_replaces_hot_zone_content() {
    let mut h = harness();
    h.zones.enter_zone(&zone("forest")).unwrap();
    let enemy = h.zones.instance().unwrap().by_kind(ObjectKind::Enemy)[0].id.clone();
    despawn(&mut h.zones, &enemy);
    assert!(h.zones.autosave());

    let spawned = h.zones.regenerate(&zone("forest")).unwrap();
    assert_eq!(spawned, 19);

    let instance = h.zones.instance().unwrap();
    assert_eq!(instance.len(), 19);
    assert_eq!(instance.active_records().count(), 19);
    let stored = h.zones.persistence().snapshot(&zone("forest")).unwrap();
    assert_eq!(stored.active_count(), 19);

    assert!(matches!(
        h.zones.regenerate(&zone("town")),
        Err(ZoneError::NotHot(z)) if z == zone("town")
    ));
}

#[test]
fn test_force_regenerate_all_keeps_players() {
    let mut h = harness();
    h.zones.enter_zone(&zone("forest")).unwrap();
    assert!(h.zones.autosave());
    h.zones.enter_zone(&zone("town")).unwrap();
    let traveler = traveler_in(&mut h.zones, Position::new(600.0, 450.0));
    assert!(h.zones.autosave());

    h.zones.force_regenerate_all().unwrap();

    let store = h.zones.persistence();
    assert_eq!(store.zone_ids(), vec![zone("town")]);
    let instance = h.zones.instance().unwrap();
    assert!(instance.has_player(&traveler.id));
    assert_eq!(instance.len(), 7);
    assert_eq!(h.zones.registry().unwrap().len(), 7);
    assert_eq!(h.backend.len(), 1);
}

#[test]
fn test_force_regenerate_all_without_hot_zone() {
    let mut h = harness();
    h.zones.enter_zone(&zone("caves")).unwrap();
    assert!(h.zones.autosave());

    let mut idle = harness_with(h.backend.clone(), Arc::new(SimEntityFactory::new()));
    idle.zones.force_regenerate_all().unwrap();
    assert!(idle.zones.persistence().is_empty());
    assert!(h.backend.is_empty());
}

#[test]
fn test_system_stats() {
    let mut h = harness();
    let idle = h.zones.system_stats();
    assert!(idle.current_zone.is_none());
    assert_eq!(idle.live_entities, 0);

    h.zones.enter_zone(&zone("forest")).unwrap();
    assert!(h.zones.autosave());

    let stats = h.zones.system_stats();
    assert_eq!(stats.current_zone, Some(zone("forest")));
    assert_eq!(stats.live_entities, 19);
    assert_eq!(stats.live_by_kind.get(&ObjectKind::Pickup), Some(&5));
    assert_eq!(stats.persistence.zone_count, 1);
    assert_eq!(stats.persistence.total_objects, 19);
}

#[test]
fn test_registry_delta_tracks_gameplay_mutations() {
    let mut h = harness();
    h.zones.enter_zone(&zone("forest")).unwrap();

    let registry = h.zones.registry().unwrap();
    let newest = registry
        .iter()
        .map(|(_, entry)| entry.last_modified_at())
        .max()
        .unwrap();

    let target = registry.ids()[0].clone();
    std::thread::sleep(std::time::Duration::from_millis(2));
    h.zones
        .registry_mut()
        .unwrap()
        .get_mut(&target)
        .unwrap()
        .set_position(Position::new(10.0, 10.0));

    let changed: Vec<ObjectId> = h
        .zones
        .registry()
        .unwrap()
        .modified_after(newest)
        .iter()
        .map(|e| e.id().clone())
        .collect();
    assert_eq!(changed, vec![target]);
}
