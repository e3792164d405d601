//! # Zone Configuration Table
//!
//! Static generation parameters for every zone: dimensions, background,
//! fixed landmarks and the populations that [`crate::ZoneInstance::populate`]
//! generates.
//!
//! The table ships with a built-in set of zones ([`ZoneTable::builtin`]) and
//! can be replaced from a TOML document ([`ZoneTable::from_toml_str`]).
//!
//! ## Schema versions
//!
//! Every config carries a `configVersion`. Snapshots persisted with a config
//! older than [`CONFIG_VERSION`] (or without one) are regenerated by the
//! orchestrator when the zone is entered.

use crate::types::{ObjectKind, Position, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current zone configuration schema version.
pub const CONFIG_VERSION: u32 = 2;

/// Upper bound on the objects one zone may generate.
pub const MAX_POPULATION: u32 = 100_000;

fn default_margin() -> f64 {
    50.0
}

/// Errors raised while loading a zone table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read zone table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse zone table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid zone table: {0}")]
    Invalid(String),
}

/// A fixed point of interest placed in a zone (shop, well, shrine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

/// A sub-type and its share of a mixed population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSubtype {
    pub subtype: String,
    pub weight: f64,
}

/// Chooses which sub-type each generated object of a population gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubtypeSelector {
    /// Every object gets the same sub-type
    Fixed(String),
    /// Objects are split proportionally to the weights
    Mixed(Vec<WeightedSubtype>),
}

impl SubtypeSelector {
    /// Splits `count` objects across the selector's sub-types.
    ///
    /// Mixed selectors use largest-remainder allocation: every sub-type gets
    /// the floor of its proportional share and the leftover objects go to the
    /// sub-types with the largest fractional parts (earlier entries win ties),
    /// so the result always sums to `count`. Zero-count entries are omitted.
    pub fn allocate(&self, count: u32) -> Vec<(String, u32)> {
        let entries = match self {
            SubtypeSelector::Fixed(subtype) => return vec![(subtype.clone(), count)],
            SubtypeSelector::Mixed(entries) => entries,
        };

        let total: f64 = entries.iter().map(|e| e.weight.max(0.0)).sum();
        if entries.is_empty() || total <= 0.0 {
            let subtype = entries.first().map(|e| e.subtype.clone()).unwrap_or_default();
            return vec![(subtype, count)];
        }

        let mut shares: Vec<(usize, u32, f64)> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let exact = f64::from(count) * entry.weight.max(0.0) / total;
                let floor = exact.floor();
                (index, floor as u32, exact - floor)
            })
            .collect();

        let assigned: u32 = shares.iter().map(|(_, n, _)| *n).sum();
        let mut leftover = count.saturating_sub(assigned);

        let mut by_remainder: Vec<usize> = (0..shares.len()).collect();
        by_remainder.sort_by(|&a, &b| {
            shares[b]
                .2
                .partial_cmp(&shares[a].2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for slot in by_remainder {
            if leftover == 0 {
                break;
            }
            shares[slot].1 += 1;
            leftover -= 1;
        }

        shares
            .into_iter()
            .filter(|(_, n, _)| *n > 0)
            .map(|(index, n, _)| (entries[index].subtype.clone(), n))
            .collect()
    }
}

/// How many objects of one kind a zone is populated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSpec {
    pub kind: ObjectKind,
    pub count: u32,
    pub selector: SubtypeSelector,
}

impl PopulationSpec {
    pub fn new(kind: ObjectKind, count: u32, selector: SubtypeSelector) -> Self {
        Self { kind, count, selector }
    }

    /// A population where every object has the same sub-type.
    pub fn fixed(kind: ObjectKind, count: u32, subtype: &str) -> Self {
        Self::new(kind, count, SubtypeSelector::Fixed(subtype.to_string()))
    }

    /// A population split across weighted sub-types.
    pub fn mixed(kind: ObjectKind, count: u32, weights: &[(&str, f64)]) -> Self {
        let entries = weights
            .iter()
            .map(|(subtype, weight)| WeightedSubtype {
                subtype: subtype.to_string(),
                weight: *weight,
            })
            .collect();
        Self::new(kind, count, SubtypeSelector::Mixed(entries))
    }
}

/// Static generation parameters for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfig {
    /// Display name shown on zone entry
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub width: f64,
    pub height: f64,
    /// Border kept free of generated objects
    #[serde(default = "default_margin")]
    pub margin: f64,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub populations: Vec<PopulationSpec>,
    /// Schema version; 0 when the stored config predates versioning
    #[serde(default)]
    pub config_version: u32,
}

impl ZoneConfig {
    /// A bare config of the current schema version with no populations.
    pub fn new(name: &str, width: f64, height: f64) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            width,
            height,
            margin: default_margin(),
            background: String::new(),
            landmarks: Vec::new(),
            populations: Vec::new(),
            config_version: CONFIG_VERSION,
        }
    }

    pub fn with_population(mut self, population: PopulationSpec) -> Self {
        self.populations.push(population);
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Centre of the zone, used as the spawn point when nothing better exists.
    pub fn center(&self) -> Position {
        Position::new(self.width / 2.0, self.height / 2.0)
    }

    /// Total number of objects [`crate::ZoneInstance::populate`] generates,
    /// saturating at `u32::MAX`.
    pub fn population_size(&self) -> u32 {
        self.populations
            .iter()
            .fold(0u32, |total, p| total.saturating_add(p.count))
    }

    /// Whether this config was written by an older schema.
    pub fn is_outdated(&self) -> bool {
        self.config_version < CONFIG_VERSION
    }

    /// Validates dimensions, margin and population size.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(format!("Zone '{}' must have positive dimensions", self.name));
        }
        if !(self.width.is_finite() && self.height.is_finite()) {
            return Err(format!("Zone '{}' must have finite dimensions", self.name));
        }
        if !(self.margin >= 0.0 && self.margin.is_finite()) {
            return Err(format!("Zone '{}' margin must be a non-negative number", self.name));
        }
        if self.margin * 2.0 > self.width || self.margin * 2.0 > self.height {
            return Err(format!(
                "Zone '{}' margin {} leaves no interior in a {}x{} area",
                self.name, self.margin, self.width, self.height
            ));
        }
        if self.population_size() > MAX_POPULATION {
            return Err(format!(
                "Zone '{}' generates more than {} objects",
                self.name, MAX_POPULATION
            ));
        }
        Ok(())
    }

    fn fallback() -> Self {
        Self::new("Wilderness", 1000.0, 1000.0)
    }
}

/// Keyed table of zone configurations with a default zone for unknown ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTable {
    pub default_zone: ZoneId,
    pub zones: BTreeMap<ZoneId, ZoneConfig>,
}

impl ZoneTable {
    /// Builds a table from explicit zones.
    pub fn new(default_zone: impl Into<ZoneId>, zones: impl IntoIterator<Item = (ZoneId, ZoneConfig)>) -> Self {
        Self {
            default_zone: default_zone.into(),
            zones: zones.into_iter().collect(),
        }
    }

    /// The zones shipped with the server.
    pub fn builtin() -> Self {
        let mut town = ZoneConfig::new("Riverside Town", 1200.0, 900.0)
            .with_population(PopulationSpec::mixed(
                ObjectKind::Npc,
                3,
                &[("merchant", 1.0), ("guard", 2.0)],
            ))
            .with_population(PopulationSpec::fixed(ObjectKind::Pickup, 4, "coin"));
        town.description = "A quiet trading town on the river.".to_string();
        town.background = "town_square".to_string();
        town.landmarks = vec![
            Landmark { name: "shop".to_string(), x: 600.0, y: 200.0 },
            Landmark { name: "well".to_string(), x: 600.0, y: 450.0 },
        ];

        let mut forest = ZoneConfig::new("Whispering Forest", 2000.0, 2000.0)
            .with_population(PopulationSpec::mixed(
                ObjectKind::Enemy,
                8,
                &[("wolf", 0.75), ("boar", 0.25)],
            ))
            .with_population(PopulationSpec::fixed(ObjectKind::Pickup, 5, "herb"))
            .with_population(PopulationSpec::fixed(ObjectKind::ResourceNode, 6, "oak"));
        forest.description = "Dense woods full of wolves.".to_string();
        forest.background = "forest_floor".to_string();

        let mut caves = ZoneConfig::new("Echo Caves", 1500.0, 1000.0)
            .with_population(PopulationSpec::mixed(
                ObjectKind::Enemy,
                10,
                &[("bat", 0.5), ("spider", 0.3), ("troll", 0.2)],
            ))
            .with_population(PopulationSpec::fixed(ObjectKind::ResourceNode, 8, "iron_ore"));
        caves.description = "Dark tunnels rich in ore.".to_string();
        caves.background = "cave_rock".to_string();

        let mut mountains = ZoneConfig::new("Frostpeak Mountains", 2400.0, 1600.0)
            .with_population(PopulationSpec::fixed(ObjectKind::Enemy, 6, "yeti"))
            .with_population(PopulationSpec::mixed(
                ObjectKind::ResourceNode,
                5,
                &[("silver_ore", 0.6), ("crystal", 0.4)],
            ))
            .with_population(PopulationSpec::fixed(ObjectKind::Npc, 1, "hermit"));
        mountains.description = "Snowy peaks where yetis roam.".to_string();
        mountains.background = "snowfield".to_string();
        mountains.landmarks = vec![Landmark { name: "shrine".to_string(), x: 1200.0, y: 300.0 }];

        Self::new(
            "town",
            [
                (ZoneId::new("town"), town),
                (ZoneId::new("forest"), forest),
                (ZoneId::new("caves"), caves),
                (ZoneId::new("mountains"), mountains),
            ],
        )
    }

    /// Parses a table from TOML and stamps every zone with the current
    /// schema version.
    ///
    /// ```toml
    /// default_zone = "arena"
    ///
    /// [zones.arena]
    /// name = "Arena"
    /// width = 800.0
    /// height = 800.0
    ///
    /// [[zones.arena.populations]]
    /// kind = "enemy"
    /// count = 5
    /// selector = "gladiator"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut table: ZoneTable = toml::from_str(content)?;
        for config in table.zones.values_mut() {
            config.config_version = CONFIG_VERSION;
        }
        table.validate().map_err(ConfigError::Invalid)?;
        Ok(table)
    }

    /// Reads and parses a TOML table from disk.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks that the default zone exists and every config is well formed.
    pub fn validate(&self) -> Result<(), String> {
        if !self.zones.contains_key(&self.default_zone) {
            return Err(format!("Default zone '{}' is not defined", self.default_zone));
        }
        for config in self.zones.values() {
            config.validate()?;
        }
        Ok(())
    }

    pub fn contains(&self, zone_id: &ZoneId) -> bool {
        self.zones.contains_key(zone_id)
    }

    /// Config for `zone_id`, falling back to the default zone for unknown ids.
    pub fn config_for(&self, zone_id: &ZoneId) -> ZoneConfig {
        self.zones
            .get(zone_id)
            .or_else(|| self.zones.get(&self.default_zone))
            .cloned()
            .unwrap_or_else(ZoneConfig::fallback)
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &ZoneId> {
        self.zones.keys()
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        Self::builtin()
    }
}
