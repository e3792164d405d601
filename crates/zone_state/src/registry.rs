//! # Object Registry
//!
//! Runtime-only index of the live entities of the hot zone: id → live
//! handle, plus kind → id set for bulk queries. The registry is torn down
//! and rebuilt whenever the hot zone changes and is never persisted.
//!
//! Every entry carries `created_at`/`last_modified_at` so the registry can
//! answer delta-sync queries ([`ObjectRegistry::modified_after`]) without
//! consulting the records.

use crate::live::LiveEntity;
use crate::types::{ObjectId, ObjectKind};
use crate::utils::{current_timestamp_ms, monotonic_after};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Generator of `"{prefix}_{counter}_{millis}"` identifiers.
///
/// The counter is strictly increasing, so two calls never collide even
/// within the same millisecond.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    counter: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier for `prefix`.
    pub fn next_id(&mut self, prefix: &str) -> ObjectId {
        self.counter += 1;
        ObjectId(format!("{prefix}_{}_{}", self.counter, current_timestamp_ms()))
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// A registered live entity and its bookkeeping.
#[derive(Debug)]
pub struct RegistryEntry {
    handle: Box<dyn LiveEntity>,
    kind: ObjectKind,
    created_at: u64,
    last_modified_at: u64,
}

impl RegistryEntry {
    pub fn handle(&self) -> &dyn LiveEntity {
        &*self.handle
    }

    /// Mutable access without marking the entry modified.
    pub fn handle_mut(&mut self) -> &mut (dyn LiveEntity + 'static) {
        &mut *self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_modified_at(&self) -> u64 {
        self.last_modified_at
    }

    fn touch(&mut self) {
        self.last_modified_at = monotonic_after(self.last_modified_at);
    }
}

/// Index of the live entities of the hot zone.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    /// All registered entities
    entries: HashMap<ObjectId, RegistryEntry>,
    /// Kind to ids mapping
    kind_index: HashMap<ObjectKind, HashSet<ObjectId>>,
    ids: IdGenerator,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an identifier unique for this registry's lifetime.
    pub fn generate_id(&mut self, prefix: &str) -> ObjectId {
        self.ids.next_id(prefix)
    }

    /// Registers `handle` under `id`, replacing any previous registration.
    ///
    /// The handle's id is set to `id`. Timestamps are taken from the handle
    /// when it carries them, otherwise both are stamped with the current time.
    pub fn register(&mut self, id: ObjectId, mut handle: Box<dyn LiveEntity>) {
        handle.set_id(id.clone());
        let kind = handle.kind();
        let (created_at, last_modified_at) = handle.timestamps().unwrap_or_else(|| {
            let now = current_timestamp_ms();
            (now, now)
        });

        let entry = RegistryEntry {
            handle,
            kind,
            created_at,
            last_modified_at: last_modified_at.max(created_at),
        };

        if let Some(previous) = self.entries.insert(id.clone(), entry) {
            debug!("♻️ Replacing registration of {} ({})", id, previous.kind);
            self.remove_from_kind_index(&id, previous.kind);
        }
        self.kind_index.entry(kind).or_default().insert(id);
    }

    /// Removes `id` from both indexes; `false` when it was not registered.
    pub fn unregister(&mut self, id: &ObjectId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                self.remove_from_kind_index(id, entry.kind);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&dyn LiveEntity> {
        self.entries.get(id).map(|entry| entry.handle())
    }

    /// Mutable access for the gameplay loop; marks the entity modified.
    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut (dyn LiveEntity + 'static)> {
        let entry = self.entries.get_mut(id)?;
        entry.touch();
        Some(entry.handle_mut())
    }

    pub fn entry(&self, id: &ObjectId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Marks `id` modified without borrowing it; `false` when absent.
    pub fn touch(&mut self, id: &ObjectId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Live handles registered under `kind`, in unspecified order.
    pub fn by_kind(&self, kind: ObjectKind) -> Vec<&dyn LiveEntity> {
        self.kind_index
            .get(&kind)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entries.get(id))
                    .map(|entry| entry.handle())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live handles whose `last_modified_at` is strictly after `timestamp`.
    pub fn modified_after(&self, timestamp: u64) -> Vec<&dyn LiveEntity> {
        self.entries
            .values()
            .filter(|entry| entry.last_modified_at > timestamp)
            .map(|entry| entry.handle())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &RegistryEntry)> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of registered entities per kind.
    pub fn kind_counts(&self) -> HashMap<ObjectKind, usize> {
        self.kind_index
            .iter()
            .map(|(kind, ids)| (*kind, ids.len()))
            .collect()
    }

    /// Empties both indexes and resets the id counter.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.kind_index.clear();
        self.ids.reset();
        debug!("🧹 Object registry cleared ({} entities dropped)", dropped);
    }

    fn remove_from_kind_index(&mut self, id: &ObjectId, kind: ObjectKind) {
        if let Some(ids) = self.kind_index.get_mut(&kind) {
            ids.remove(id);
            if ids.is_empty() {
                self.kind_index.remove(&kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::SimEntity;
    use crate::types::Position;

    fn entity(kind: ObjectKind) -> Box<dyn LiveEntity> {
        Box::new(SimEntity::new(kind, "test", Position::new(1.0, 1.0)))
    }

    #[test]
    fn test_generated_ids_are_unique_within_a_tick() {
        let mut registry = ObjectRegistry::new();
        let ids: HashSet<ObjectId> = (0..1000).map(|_| registry.generate_id("enemy")).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("enemy_")));
    }

    #[test]
    fn test_register_sets_id_and_timestamps() {
        let mut registry = ObjectRegistry::new();
        let id = registry.generate_id("enemy");
        registry.register(id.clone(), entity(ObjectKind::Enemy));

        let entry = registry.entry(&id).unwrap();
        assert_eq!(entry.handle().id(), &id);
        assert!(entry.created_at() > 0);
        assert_eq!(entry.created_at(), entry.last_modified_at());
    }

    #[test]
    fn test_reregistration_overwrites_and_reindexes() {
        let mut registry = ObjectRegistry::new();
        let id = ObjectId::new("shared");
        registry.register(id.clone(), entity(ObjectKind::Enemy));
        registry.register(id.clone(), entity(ObjectKind::Pickup));

        assert_eq!(registry.len(), 1);
        assert!(registry.by_kind(ObjectKind::Enemy).is_empty());
        assert_eq!(registry.by_kind(ObjectKind::Pickup).len(), 1);
    }

    #[test]
    fn test_unregister_reports_absence() {
        let mut registry = ObjectRegistry::new();
        let id = ObjectId::new("a");
        registry.register(id.clone(), entity(ObjectKind::Npc));

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.by_kind(ObjectKind::Npc).is_empty());
        assert!(registry.kind_counts().is_empty());
    }

    #[test]
    fn test_by_kind_is_idempotent() {
        let mut registry = ObjectRegistry::new();
        for _ in 0..5 {
            let id = registry.generate_id("enemy");
            registry.register(id, entity(ObjectKind::Enemy));
        }
        let id = registry.generate_id("pickup");
        registry.register(id, entity(ObjectKind::Pickup));

        let first: HashSet<ObjectId> = registry
            .by_kind(ObjectKind::Enemy)
            .iter()
            .map(|e| e.id().clone())
            .collect();
        let second: HashSet<ObjectId> = registry
            .by_kind(ObjectKind::Enemy)
            .iter()
            .map(|e| e.id().clone())
            .collect();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_modified_after_is_strict() {
        let mut registry = ObjectRegistry::new();
        let id = ObjectId::new("a");
        registry.register(id.clone(), entity(ObjectKind::Enemy));
        let stamp = registry.entry(&id).unwrap().last_modified_at();

        assert_eq!(registry.modified_after(stamp - 1).len(), 1);
        assert!(registry.modified_after(stamp).is_empty());

        let moved = registry.get_mut(&id).unwrap();
        moved.set_position(Position::new(9.0, 9.0));
        let touched = registry.entry(&id).unwrap().last_modified_at();
        assert!(touched >= stamp);
        assert_eq!(registry.modified_after(touched - 1).len(), 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut registry = ObjectRegistry::new();
        let first = registry.generate_id("x");
        registry.register(first.clone(), entity(ObjectKind::Enemy));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.by_kind(ObjectKind::Enemy).is_empty());
        assert!(registry.get(&first).is_none());
        assert!(registry.generate_id("x").as_str().starts_with("x_1_"));
    }
}
