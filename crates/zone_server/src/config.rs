//! Configuration management for the zone server.
//!
//! This module handles loading and validation of server configuration from
//! TOML files, and turns the persistence and world sections into the zone
//! state types the server runs on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use zone_state::{
    ConfigError, JsonDirBackend, MemoryBackend, PortalTable, SnapshotBackend, ZoneId, ZoneTable,
};

fn default_instance_id() -> String {
    zone_state::InstanceId::DEFAULT.to_string()
}

fn default_max_age_secs() -> Option<u64> {
    Some(7 * 24 * 60 * 60)
}

fn default_autosave_interval_ms() -> u64 {
    30_000
}

fn default_stats_interval_secs() -> u64 {
    60
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which zones exist and where players start
    pub world: WorldSettings,
    /// Durable zone snapshot storage
    pub persistence: PersistenceSettings,
    /// Periodic write-back of the hot zone
    #[serde(default)]
    pub autosave: AutosaveSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Health reporting
    #[serde(default)]
    pub monitoring: MonitoringSettings,
}

/// World layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    /// Zone loaded at startup
    pub start_zone: String,
    /// Instance id stamped on freshly generated zones
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Optional TOML zone table replacing the built-in zones. Its
    /// `[[portals]]` entries replace the built-in portals.
    #[serde(default)]
    pub zone_table: Option<String>,
}

/// Snapshot storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per zone under `directory`
    Json,
    /// Nothing survives a restart
    Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    pub backend: BackendKind,
    /// Snapshot directory for the JSON backend
    pub directory: String,
    /// Snapshots older than this are evicted at startup (0 keeps everything)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: Option<u64>,
}

/// Autosave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveSettings {
    /// Interval between autosaves in milliseconds (0 to disable)
    #[serde(default = "default_autosave_interval_ms")]
    pub interval_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Health report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Seconds between health reports (0 to disable)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_autosave_interval_ms(),
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            world: WorldSettings {
                start_zone: "town".to_string(),
                instance_id: default_instance_id(),
                zone_table: None,
            },
            persistence: PersistenceSettings {
                backend: BackendKind::Json,
                directory: "zones".to_string(),
                max_age_secs: default_max_age_secs(),
            },
            autosave: AutosaveSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.world.start_zone.trim().is_empty() {
            return Err("world.start_zone cannot be empty".to_string());
        }

        if self.world.instance_id.trim().is_empty() {
            return Err("world.instance_id cannot be empty".to_string());
        }

        if self.persistence.backend == BackendKind::Json && self.persistence.directory.is_empty() {
            return Err("persistence.directory cannot be empty for the json backend".to_string());
        }

        if self.autosave.interval_ms != 0 && self.autosave.interval_ms < 100 {
            return Err(format!(
                "autosave.interval_ms must be 0 (disabled) or at least 100, got {}",
                self.autosave.interval_ms
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn start_zone(&self) -> ZoneId {
        ZoneId::new(self.world.start_zone.as_str())
    }

    /// The configured zone table, or the built-in one.
    pub fn zone_table(&self) -> Result<ZoneTable, ConfigError> {
        match &self.world.zone_table {
            Some(path) => ZoneTable::load_from_file(Path::new(path)),
            None => Ok(ZoneTable::builtin()),
        }
    }

    /// Portals of the configured zone table file, or the built-in ones.
    pub fn portal_table(&self) -> Result<PortalTable, ConfigError> {
        match &self.world.zone_table {
            Some(path) => PortalTable::load_from_file(Path::new(path)),
            None => Ok(PortalTable::builtin()),
        }
    }

    pub fn snapshot_backend(&self) -> Arc<dyn SnapshotBackend> {
        match self.persistence.backend {
            BackendKind::Json => Arc::new(JsonDirBackend::new(PathBuf::from(&self.persistence.directory))),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        }
    }

    pub fn max_snapshot_age(&self) -> Option<Duration> {
        self.persistence
            .max_age_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave.interval_ms > 0).then(|| Duration::from_millis(self.autosave.interval_ms))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.monitoring.stats_interval_secs > 0).then(|| Duration::from_secs(self.monitoring.stats_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.world.start_zone, "town");
        assert_eq!(config.world.instance_id, "default");
        assert!(config.world.zone_table.is_none());

        assert_eq!(config.persistence.backend, BackendKind::Json);
        assert_eq!(config.persistence.directory, "zones");
        assert_eq!(config.max_snapshot_age(), Some(Duration::from_secs(604_800)));

        assert_eq!(config.autosave_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.world.start_zone = " ".to_string();
        assert!(config.validate().is_err());

        config.world.start_zone = "forest".to_string();
        config.persistence.directory = String::new();
        assert!(config.validate().is_err());

        config.persistence.backend = BackendKind::Memory;
        assert!(config.validate().is_ok());

        config.autosave.interval_ms = 10;
        assert!(config.validate().is_err());

        config.autosave.interval_ms = 0;
        assert!(config.validate().is_ok());
        assert!(config.autosave_interval().is_none());

        config.persistence.max_age_secs = Some(0);
        assert!(config.max_snapshot_age().is_none());

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zone_server.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.world.start_zone, "town");
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.persistence.directory, config.persistence.directory);
        assert_eq!(reloaded.persistence.max_age_secs, config.persistence.max_age_secs);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[world]
start_zone = "caves"

[persistence]
backend = "memory"
directory = ""

[logging]
level = "debug"
json_format = true
"#;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, toml_content).await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.start_zone(), ZoneId::new("caves"));
        assert_eq!(config.world.instance_id, "default");
        assert_eq!(config.persistence.backend, BackendKind::Memory);
        assert_eq!(config.autosave.interval_ms, 30_000);
        assert_eq!(config.monitoring.stats_interval_secs, 60);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[world\nstart_zone = ").await.unwrap();

        assert!(AppConfig::load_from_file(&path).await.is_err());
    }

    #[test]
    fn test_custom_zone_table() {
        let dir = TempDir::new().unwrap();
        let table_path = dir.path().join("zones.toml");
        std::fs::write(
            &table_path,
            r#"
default_zone = "arena"

[zones.arena]
name = "Arena"
width = 800.0
height = 600.0

[[zones.arena.populations]]
kind = "enemy"
count = 4
selector = "gladiator"

[zones.pit]
name = "Pit"
width = 400.0
height = 400.0

[[portals]]
source_zone = "arena"
x = 780.0
y = 300.0
radius = 20.0
target_zone = "pit"
entry_x = 60.0
entry_y = 200.0
"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        assert_eq!(config.portal_table().unwrap(), PortalTable::builtin());

        config.world.zone_table = Some(table_path.to_string_lossy().to_string());
        let table = config.zone_table().unwrap();
        assert!(table.contains(&ZoneId::new("arena")));
        assert!(!table.contains(&ZoneId::new("town")));

        let portals = config.portal_table().unwrap();
        assert_eq!(portals.len(), 1);
        assert!(portals.validate(&table).is_ok());

        config.world.zone_table = Some(dir.path().join("missing.toml").to_string_lossy().to_string());
        assert!(config.zone_table().is_err());
        assert!(config.portal_table().is_err());
    }
}
