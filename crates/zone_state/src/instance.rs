//! # Zone Instance
//!
//! A [`ZoneInstance`] owns the authoritative record set of one zone: the
//! object records, the zone's generation config and the players currently
//! bound to it. It is plain state; live behaviour is attached by the
//! orchestrator while the zone is hot.
//!
//! ## Lifecycle
//!
//! 1. Created on first access through the persistence store, populated once
//!    from its config ([`ZoneInstance::new`])
//! 2. Mutated throughout gameplay ([`ZoneInstance::update`],
//!    [`ZoneInstance::remove`])
//! 3. Serialized on save ([`ZoneInstance::serialize`]) and restored exactly
//!    on load ([`ZoneInstance::deserialize`])
//!
//! Instances are never destroyed explicitly; only persistence eviction drops
//! them.
//!
//! ## Invariants
//!
//! - every key of the object map equals the `id` of its record
//! - after every successful mutation `last_update >= max(lastModifiedAt)`

use crate::config::{ZoneConfig, ZoneTable};
use crate::record::{ObjectRecord, RecordPatch, RecordPayload};
use crate::registry::IdGenerator;
use crate::snapshot::ZoneSnapshot;
use crate::types::{InstanceId, ObjectId, ObjectKind, PlayerId, Position, ZoneId};
use crate::utils::{current_timestamp_ms, monotonic_after};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Authoritative state of one zone.
#[derive(Debug, Clone)]
pub struct ZoneInstance {
    zone_id: ZoneId,
    instance_id: InstanceId,
    config: ZoneConfig,
    objects: BTreeMap<ObjectId, ObjectRecord>,
    players: BTreeSet<PlayerId>,
    last_update: u64,
    ids: IdGenerator,
    /// Set when the loaded config predates [`crate::config::CONFIG_VERSION`]
    needs_migration: bool,
}

impl ZoneInstance {
    /// Creates and populates an instance using the zone table's config for
    /// `zone_id` (the default zone's config for unknown ids).
    pub fn new(zone_id: ZoneId, instance_id: InstanceId, table: &ZoneTable) -> Self {
        let config = table.config_for(&zone_id);
        Self::from_config(zone_id, instance_id, config)
    }

    /// Creates and populates an instance with an explicit config.
    pub fn from_config(zone_id: ZoneId, instance_id: InstanceId, config: ZoneConfig) -> Self {
        let mut instance = Self::empty(zone_id, instance_id, config);
        let created = instance.populate();
        debug!(
            "🌱 Generated {} objects for zone {} ({})",
            created.len(),
            instance.zone_id,
            instance.instance_id
        );
        instance
    }

    /// Creates an instance with no objects and no players.
    pub fn empty(zone_id: ZoneId, instance_id: InstanceId, config: ZoneConfig) -> Self {
        Self {
            zone_id,
            instance_id,
            config,
            objects: BTreeMap::new(),
            players: BTreeSet::new(),
            last_update: current_timestamp_ms(),
            ids: IdGenerator::new(),
            needs_migration: false,
        }
    }

    pub fn zone_id(&self) -> &ZoneId {
        &self.zone_id
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn players(&self) -> &BTreeSet<PlayerId> {
        &self.players
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, ObjectRecord> {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether the stored config predates the current schema version.
    pub fn needs_migration(&self) -> bool {
        self.needs_migration
    }

    /// Replaces the generation config. Existing records are kept; callers
    /// regenerating content clear and re-populate afterwards.
    pub fn set_config(&mut self, config: ZoneConfig) {
        self.needs_migration = config.is_outdated();
        self.config = config;
        self.bump(current_timestamp_ms());
    }

    /// Generates the configured populations and appends them.
    ///
    /// Positions are uniform over the zone interior, `margin` away from every
    /// edge. Existing records are kept; clear first for a full reset.
    pub fn populate(&mut self) -> Vec<ObjectId> {
        self.populate_with(&mut rand::thread_rng())
    }

    /// [`ZoneInstance::populate`] with a caller-supplied RNG.
    pub fn populate_with<R: Rng>(&mut self, rng: &mut R) -> Vec<ObjectId> {
        let Some((x_range, y_range)) = self.interior() else {
            warn!(
                "Zone {} has non-finite extents {}x{}, nothing generated",
                self.zone_id, self.config.width, self.config.height
            );
            return Vec::new();
        };
        let now = monotonic_after(self.last_update);
        let mut created = Vec::new();

        let populations = self.config.populations.clone();
        for population in &populations {
            for (subtype, count) in population.selector.allocate(population.count) {
                for _ in 0..count {
                    let id = self.fresh_id(population.kind);
                    let position = Position::new(
                        rng.gen_range(x_range.0..=x_range.1),
                        rng.gen_range(y_range.0..=y_range.1),
                    );
                    let payload = RecordPayload::for_kind(population.kind, subtype.clone());
                    let record = ObjectRecord::new(id.clone(), payload, position, now);
                    self.objects.insert(id.clone(), record);
                    created.push(id);
                }
            }
        }

        self.bump(now);
        created
    }

    /// Drops every record.
    pub fn clear_objects(&mut self) {
        self.objects.clear();
        self.bump(current_timestamp_ms());
    }

    /// Adds an externally built record; `false` if its id is taken.
    pub fn insert(&mut self, record: ObjectRecord) -> bool {
        if self.objects.contains_key(&record.id) {
            return false;
        }
        let stamp = record.last_modified_at;
        self.objects.insert(record.id.clone(), record);
        self.bump(stamp.max(current_timestamp_ms()));
        true
    }

    pub fn get(&self, id: &ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(id)
    }

    /// Merges `patch` into record `id` and stamps `lastModifiedAt`.
    ///
    /// Returns `false` without mutating anything when `id` is absent or the
    /// patch tries to change the record's kind.
    pub fn update(&mut self, id: &ObjectId, patch: RecordPatch) -> bool {
        let Some(record) = self.objects.get_mut(id) else {
            return false;
        };
        if !record.apply(patch, current_timestamp_ms()) {
            warn!("Rejected kind-changing update of {} in zone {}", id, self.zone_id);
            return false;
        }
        let stamp = record.last_modified_at;
        self.bump(stamp);
        true
    }

    /// Deletes record `id`; `false` if absent.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        if self.objects.remove(id).is_none() {
            return false;
        }
        self.bump(current_timestamp_ms());
        true
    }

    /// Records of `kind`, active or not.
    pub fn by_kind(&self, kind: ObjectKind) -> Vec<&ObjectRecord> {
        self.objects.values().filter(|r| r.kind() == kind).collect()
    }

    pub fn active_records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values().filter(|r| r.active)
    }

    /// Records with `lastModifiedAt` strictly after `timestamp`.
    pub fn modified_after(&self, timestamp: u64) -> Vec<&ObjectRecord> {
        self.objects
            .values()
            .filter(|r| r.last_modified_at > timestamp)
            .collect()
    }

    /// Binds a player to this instance; `false` if already present.
    pub fn add_player(&mut self, player_id: PlayerId) -> bool {
        let added = self.players.insert(player_id);
        if added {
            self.bump(current_timestamp_ms());
        }
        added
    }

    /// Unbinds a player; `false` if not present.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let removed = self.players.remove(player_id);
        if removed {
            self.bump(current_timestamp_ms());
        }
        removed
    }

    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains(player_id)
    }

    /// Converts the instance to its persisted form.
    pub fn serialize(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            zone_id: self.zone_id.clone(),
            instance_id: self.instance_id.clone(),
            last_update: self.last_update,
            objects: self
                .objects
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            players: self.players.iter().cloned().collect(),
            config: Some(self.config.clone()),
            saved_at: None,
        }
    }

    /// Restores an instance from its persisted form, timestamps included.
    ///
    /// Snapshots without a config take the table's config and are flagged
    /// for migration, as are snapshots whose config version is outdated.
    pub fn deserialize(snapshot: ZoneSnapshot, table: &ZoneTable) -> Self {
        let (config, needs_migration) = match snapshot.config {
            Some(config) => {
                let outdated = config.is_outdated();
                (config, outdated)
            }
            None => (table.config_for(&snapshot.zone_id), true),
        };

        let mut objects = BTreeMap::new();
        let mut newest = snapshot.last_update;
        for (key, record) in snapshot.objects {
            if key != record.id {
                warn!(
                    "Snapshot of zone {} stores record {} under key {}; using the record id",
                    snapshot.zone_id, record.id, key
                );
            }
            newest = newest.max(record.last_modified_at);
            if let Some(previous) = objects.insert(record.id.clone(), record) {
                warn!("Duplicate record {} in snapshot of zone {}", previous.id, snapshot.zone_id);
            }
        }

        Self {
            zone_id: snapshot.zone_id,
            instance_id: snapshot.instance_id,
            config,
            objects,
            players: snapshot.players.into_iter().collect(),
            last_update: newest,
            ids: IdGenerator::new(),
            needs_migration,
        }
    }

    fn bump(&mut self, stamp: u64) {
        self.last_update = self.last_update.max(stamp);
    }

    fn fresh_id(&mut self, kind: ObjectKind) -> ObjectId {
        loop {
            let id = self.ids.next_id(kind.as_str());
            if !self.objects.contains_key(&id) {
                return id;
            }
        }
    }

    /// Inclusive coordinate ranges generation draws from.
    /// Sampling ranges for generated positions; `None` for unbounded zones.
    fn interior(&self) -> Option<((f64, f64), (f64, f64))> {
        if !(self.config.width.is_finite() && self.config.height.is_finite()) {
            return None;
        }
        let axis = |extent: f64| {
            let margin = self.config.margin.max(0.0);
            let low = margin.min(extent / 2.0);
            let high = (extent - margin).max(low);
            (low, high)
        };
        Some((axis(self.config.width), axis(self.config.height)))
    }
}
