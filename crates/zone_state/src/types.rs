//! # Core Type Definitions
//!
//! Fundamental identifier and spatial types shared by every layer of the zone
//! state system.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - Unique identifier for a traveler/player
//! - [`ZoneId`] - Identifier of a zone (map) in the zone table
//! - [`InstanceId`] - Qualifier for concurrent copies of the same zone
//! - [`ObjectId`] - Globally unique identifier of a zone-resident object
//! - [`ObjectKind`] - Closed set of object kinds that populate zones
//! - [`Position`] - 2D position inside a zone
//!
//! Wrapper types keep the different identifiers from being confused with one
//! another while still serializing as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generates the boilerplate shared by the string-backed identifier types.
///
/// The `@base` arm leaves construction to the caller so a type can mint its
/// own values.
macro_rules! string_id {
    (@base $(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
    ($(#[$meta:meta])* $name:ident) => {
        string_id!(@base $(#[$meta])* $name);

        impl $name {
            /// Creates the identifier from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }
        }
    };
}

string_id!(
    @base
    /// Unique identifier for a player in the game world.
    ///
    /// Freshly minted ids are UUID v4 strings, but any string read back from
    /// a snapshot is accepted as-is.
    ///
    /// ```rust
    /// use zone_state::PlayerId;
    ///
    /// let player_id = PlayerId::new();
    /// let parsed: PlayerId = player_id.to_string().parse()?;
    /// assert_eq!(player_id, parsed);
    ///
    /// let legacy: PlayerId = "player_1".parse()?;
    /// assert_eq!(legacy.as_str(), "player_1");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    PlayerId
);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::str::FromStr for PlayerId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

string_id!(
    /// Identifier of a zone in the zone configuration table (e.g. `"forest"`).
    ZoneId
);

string_id!(
    /// Sub-instance qualifier for a zone. Every zone currently runs a single
    /// instance named [`InstanceId::DEFAULT`].
    InstanceId
);

string_id!(
    /// Identifier of a zone-resident object. Immutable once assigned and
    /// unique for the lifetime of the owning zone instance.
    ObjectId
);

impl InstanceId {
    /// Name of the instance used when a zone has no concurrent copies.
    pub const DEFAULT: &'static str = "default";
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// The closed set of object kinds that can populate a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Hostile unit
    Enemy,
    /// Collectible item lying on the ground
    Pickup,
    /// Harvestable resource node (trees, ore veins)
    #[serde(rename = "resource")]
    ResourceNode,
    /// Non-player character
    Npc,
}

impl ObjectKind {
    /// Every kind, in declaration order.
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Enemy,
        ObjectKind::Pickup,
        ObjectKind::ResourceNode,
        ObjectKind::Npc,
    ];

    /// Wire name of the kind, identical to its serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Enemy => "enemy",
            ObjectKind::Pickup => "pickup",
            ObjectKind::ResourceNode => "resource",
            ObjectKind::Npc => "npc",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position inside a zone, in zone-local units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_wire_names() {
        for kind in ObjectKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_string_ids_serialize_transparently() {
        let id = ZoneId::new("forest");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"forest\"");
        assert_eq!(InstanceId::default().as_str(), "default");
    }

    #[test]
    fn test_player_ids_accept_any_string() {
        let minted = PlayerId::new();
        assert!(Uuid::parse_str(minted.as_str()).is_ok());
        assert_ne!(minted, PlayerId::new());

        let legacy: PlayerId = serde_json::from_str("\"player_1\"").unwrap();
        assert_eq!(legacy, PlayerId::from("player_1"));
        assert_eq!(serde_json::to_string(&legacy).unwrap(), "\"player_1\"");
    }

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
    }
}
