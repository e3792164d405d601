//! Zone transition points.
//!
//! A portal table can live in the same TOML document as a custom zone
//! table, as an array of `[[portals]]` entries:
//!
//! ```toml
//! [[portals]]
//! source_zone = "arena"
//! x = 790.0
//! y = 400.0
//! radius = 30.0
//! target_zone = "pit"
//! entry_x = 60.0
//! entry_y = 300.0
//! ```

use crate::config::{ConfigError, ZoneTable};
use crate::types::{Position, ZoneId};
use serde::{Deserialize, Serialize};

/// A point in `source_zone` that moves a traveler to `target_zone`,
/// arriving at `(entry_x, entry_y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub source_zone: ZoneId,
    pub x: f64,
    pub y: f64,
    /// Activation radius around `(x, y)`
    pub radius: f64,
    pub target_zone: ZoneId,
    pub entry_x: f64,
    pub entry_y: f64,
}

impl Portal {
    pub fn new(source_zone: &str, at: (f64, f64), radius: f64, target_zone: &str, entry: (f64, f64)) -> Self {
        Self {
            source_zone: ZoneId::new(source_zone),
            x: at.0,
            y: at.1,
            radius,
            target_zone: ZoneId::new(target_zone),
            entry_x: entry.0,
            entry_y: entry.1,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn entry(&self) -> Position {
        Position::new(self.entry_x, self.entry_y)
    }

    /// Whether `position` lies within the activation radius (inclusive).
    pub fn contains(&self, position: Position) -> bool {
        self.position().distance(position) <= self.radius
    }
}

/// Ordered list of portals; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalTable {
    #[serde(default)]
    portals: Vec<Portal>,
}

impl PortalTable {
    pub fn new(portals: Vec<Portal>) -> Self {
        Self { portals }
    }

    /// Links between the built-in zones: town ↔ forest, forest ↔ caves and
    /// forest ↔ mountains. Entry points sit outside the return portal's
    /// radius.
    pub fn builtin() -> Self {
        Self::new(vec![
            Portal::new("town", (1150.0, 450.0), 40.0, "forest", (150.0, 1000.0)),
            Portal::new("forest", (40.0, 1000.0), 40.0, "town", (1050.0, 450.0)),
            Portal::new("forest", (1000.0, 1960.0), 40.0, "caves", (750.0, 150.0)),
            Portal::new("caves", (750.0, 40.0), 40.0, "forest", (1000.0, 1850.0)),
            Portal::new("forest", (1960.0, 1000.0), 40.0, "mountains", (150.0, 800.0)),
            Portal::new("mountains", (40.0, 800.0), 40.0, "forest", (1850.0, 1000.0)),
        ])
    }

    /// Parses the `[[portals]]` entries of a TOML document. Other keys are
    /// ignored, so a zone table file can be read for both.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads the `[[portals]]` entries of a TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn push(&mut self, portal: Portal) {
        self.portals.push(portal);
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    /// Portals placed in `zone_id`.
    pub fn from_zone<'a>(&'a self, zone_id: &'a ZoneId) -> impl Iterator<Item = &'a Portal> + 'a {
        self.portals.iter().filter(move |p| &p.source_zone == zone_id)
    }

    /// First portal in `source` leading to `target`.
    pub fn first_to(&self, source: &ZoneId, target: &ZoneId) -> Option<&Portal> {
        self.portals
            .iter()
            .find(|p| &p.source_zone == source && &p.target_zone == target)
    }

    /// First portal in `zone_id` whose radius contains `position`.
    pub fn at(&self, zone_id: &ZoneId, position: Position) -> Option<&Portal> {
        self.portals
            .iter()
            .find(|p| &p.source_zone == zone_id && p.contains(position))
    }

    /// Checks radii and coordinates, and that every portal links two
    /// different known zones.
    pub fn validate(&self, table: &ZoneTable) -> Result<(), String> {
        for portal in &self.portals {
            if !(portal.radius > 0.0 && portal.radius.is_finite()) {
                return Err(format!(
                    "Portal {} -> {} must have a positive radius",
                    portal.source_zone, portal.target_zone
                ));
            }
            let coordinates = [portal.x, portal.y, portal.entry_x, portal.entry_y];
            if coordinates.iter().any(|c| !c.is_finite()) {
                return Err(format!(
                    "Portal {} -> {} has non-finite coordinates",
                    portal.source_zone, portal.target_zone
                ));
            }
            if portal.source_zone == portal.target_zone {
                return Err(format!("Portal in '{}' leads back to its own zone", portal.source_zone));
            }
            for zone in [&portal.source_zone, &portal.target_zone] {
                if !table.contains(zone) {
                    return Err(format!("Portal references unknown zone '{}'", zone));
                }
            }
        }
        Ok(())
    }
}
