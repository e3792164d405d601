//! # Live Entity Contract
//!
//! Live entities are the behaviour-bearing simulation objects that exist
//! while a zone is hot. Rendering, combat and AI live outside this crate;
//! they plug in through two seams:
//!
//! - [`LiveEntity`] - the minimal shape the orchestrator reads and writes
//! - [`EntityFactory`] - builds a live entity from an [`ObjectRecord`]
//!
//! [`SimEntity`] and [`SimEntityFactory`] are the default implementation used
//! by the server when no richer simulation is attached.

use crate::record::ObjectRecord;
use crate::types::{ObjectId, ObjectKind, Position};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Errors a factory can raise for a single record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpawnError {
    #[error("Kind '{0}' is not supported by this factory")]
    UnsupportedKind(ObjectKind),
    #[error("Record {0} has no sub-type")]
    MissingSubtype(ObjectId),
    #[error("Unknown sub-type '{subtype}' for {kind}")]
    UnknownSubtype { kind: ObjectKind, subtype: String },
}

/// Trait implemented by every live simulation object.
pub trait LiveEntity: Send + Sync + Any + Debug {
    /// Identifier shared with the backing record
    fn id(&self) -> &ObjectId;

    /// Assigns the record id; called once by the orchestrator after spawn
    fn set_id(&mut self, id: ObjectId);

    fn kind(&self) -> ObjectKind;

    fn position(&self) -> Position;

    fn set_position(&mut self, position: Position);

    /// Whether the entity is still meaningful (not killed, picked up or
    /// depleted). Written back into the record's `active` flag.
    fn is_alive(&self) -> bool;

    /// `(created_at, last_modified_at)` if the entity tracks its own
    /// timestamps. The registry stamps entities that return `None`.
    fn timestamps(&self) -> Option<(u64, u64)> {
        None
    }

    /// Get the entity as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get the entity as Any for mutable downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Builds live entities from records.
pub trait EntityFactory: Send + Sync {
    /// Whether records of this kind get a live counterpart at all.
    fn supports(&self, kind: ObjectKind) -> bool;

    /// Builds the live entity for `record`. The orchestrator assigns the
    /// record's id afterwards.
    fn spawn(&self, record: &ObjectRecord) -> Result<Box<dyn LiveEntity>, SpawnError>;
}

/// Plain simulation entity carrying only the state that round-trips through
/// records.
#[derive(Debug, Clone)]
pub struct SimEntity {
    id: ObjectId,
    kind: ObjectKind,
    subtype: String,
    position: Position,
    alive: bool,
    created_at: u64,
    modified_at: u64,
}

impl SimEntity {
    pub fn new(kind: ObjectKind, subtype: impl Into<String>, position: Position) -> Self {
        Self {
            id: ObjectId::new(""),
            kind,
            subtype: subtype.into(),
            position,
            alive: true,
            created_at: 0,
            modified_at: 0,
        }
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Kills, collects or depletes the entity depending on its kind.
    pub fn despawn(&mut self) {
        self.alive = false;
    }
}

impl LiveEntity for SimEntity {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn timestamps(&self) -> Option<(u64, u64)> {
        (self.created_at > 0).then_some((self.created_at, self.modified_at.max(self.created_at)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Default factory: spawns a [`SimEntity`] for every supported kind.
///
/// When a sub-type allow-list is configured, records with a sub-type outside
/// it are rejected with [`SpawnError::UnknownSubtype`].
#[derive(Debug, Clone)]
pub struct SimEntityFactory {
    kinds: BTreeSet<ObjectKind>,
    known_subtypes: Option<BTreeSet<String>>,
}

impl SimEntityFactory {
    /// Factory for every kind, accepting any non-empty sub-type.
    pub fn new() -> Self {
        Self {
            kinds: ObjectKind::ALL.into_iter().collect(),
            known_subtypes: None,
        }
    }

    /// Restricts the factory to the given kinds.
    pub fn with_kinds(kinds: impl IntoIterator<Item = ObjectKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            known_subtypes: None,
        }
    }

    /// Restricts accepted sub-types.
    pub fn with_known_subtypes<I, S>(mut self, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_subtypes = Some(subtypes.into_iter().map(Into::into).collect());
        self
    }
}

impl Default for SimEntityFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityFactory for SimEntityFactory {
    fn supports(&self, kind: ObjectKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn spawn(&self, record: &ObjectRecord) -> Result<Box<dyn LiveEntity>, SpawnError> {
        let kind = record.kind();
        if !self.supports(kind) {
            return Err(SpawnError::UnsupportedKind(kind));
        }

        let subtype = record.payload.subtype();
        if subtype.is_empty() {
            return Err(SpawnError::MissingSubtype(record.id.clone()));
        }
        if let Some(known) = &self.known_subtypes {
            if !known.contains(subtype) {
                return Err(SpawnError::UnknownSubtype {
                    kind,
                    subtype: subtype.to_string(),
                });
            }
        }

        let mut entity = SimEntity::new(kind, subtype, record.position);
        entity.created_at = record.created_at;
        entity.modified_at = record.last_modified_at;
        Ok(Box::new(entity))
    }
}
