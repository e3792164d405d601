//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that wires configuration,
//! persistence and the zone host together, runs the server until a shutdown
//! signal arrives, and implements the one-shot administrative commands.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    service::ZoneHost,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zone_state::{
    InstanceId, LogNotifier, PersistenceStore, PortalTable, SimEntityFactory, ZoneId,
    ZoneOrchestrator,
};

/// Main application struct.
///
/// Owns the merged configuration and the shared persistence store; the
/// orchestrator is built on demand for whichever mode the CLI selected.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Parsed command-line arguments
    args: CliArgs,
    /// Durable zone snapshots shared with the zone host
    store: Arc<PersistenceStore>,
    /// Transitions between the configured zones
    portals: PortalTable,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration, the zone table and its portals
    /// 4. Open the persistence store
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(start_zone) = &args.start_zone {
            config.world.start_zone = start_zone.clone();
        }

        if let Some(data_dir) = &args.data_dir {
            config.persistence.directory = data_dir.to_string_lossy().to_string();
        }

        if let Some(log_level) = &args.log_level {
            config.logging.level = log_level.clone();
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        let table = config.zone_table()?;
        if !table.contains(&config.start_zone()) {
            return Err(format!(
                "Start zone '{}' is not defined in the zone table",
                config.world.start_zone
            )
            .into());
        }

        let portals = config.portal_table()?;
        if let Err(e) = portals.validate(&table) {
            return Err(format!("Portal table validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        let store = Arc::new(PersistenceStore::with_instance_id(
            config.snapshot_backend(),
            Arc::new(table),
            InstanceId::new(config.world.instance_id.as_str()),
        ));

        Ok(Self {
            config,
            args,
            store,
            portals,
        })
    }

    fn orchestrator(&self) -> ZoneOrchestrator {
        ZoneOrchestrator::new(
            self.store.clone(),
            self.portals.clone(),
            Arc::new(SimEntityFactory::new()),
            Arc::new(LogNotifier),
        )
    }

    /// Runs the mode selected on the command line.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.args.is_admin_command() {
            return self.serve().await;
        }
        if self.args.stats {
            self.print_stats()
        } else {
            self.force_regenerate()
        }
    }

    /// Prints persistence statistics as JSON on stdout.
    fn print_stats(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stats = self.store.stats();
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }

    /// Wipes every stored zone and regenerates the start zone.
    fn force_regenerate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let start_zone = self.config.start_zone();
        let mut zones = self.orchestrator();
        zones.enter_zone(&start_zone)?;
        zones.force_regenerate_all()?;

        let stats = zones.system_stats();
        info!(
            "🔄 Regenerated zone {} with {} objects; {} zones stored",
            start_zone, stats.persistence.total_objects, stats.persistence.zone_count
        );
        Ok(())
    }

    /// Runs the zone host until a shutdown signal arrives.
    async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        display_banner();
        info!("🌟 Starting Zone Server");
        self.log_configuration_summary();

        if let Some(max_age) = self.config.max_snapshot_age() {
            if !self.store.evict_older_than(max_age) {
                info!("🗃️ No zone snapshots older than {:?}", max_age);
            }
        }

        let start_zone = self.config.start_zone();
        let zones = self.orchestrator();
        let (host, host_task) = ZoneHost::spawn(zones, self.config.autosave_interval());
        host.enter_zone(start_zone.clone()).await?;

        let initial = host.stats().await?;
        info!("📊 Initial Zone State:");
        info!("  - Hot zone: {}", start_zone);
        info!("  - Live entities: {}", initial.live_entities);
        info!("  - Stored zones: {}", initial.persistence.zone_count);

        let monitoring_handle = self.config.stats_interval().map(|period| {
            let host = host.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;

                loop {
                    interval.tick().await;

                    match host.stats().await {
                        Ok(stats) => info!(
                            "📊 Zone Health - hot zone {} | {} live entities | {} zones stored | {} objects",
                            stats.current_zone.as_ref().map_or("-", ZoneId::as_str),
                            stats.live_entities,
                            stats.persistence.zone_count,
                            stats.persistence.total_objects
                        ),
                        Err(e) => {
                            warn!("Health monitoring stopped: {}", e);
                            break;
                        }
                    }
                }
            })
        });

        info!("✅ Zone Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers().await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        if let Some(handle) = monitoring_handle {
            handle.abort();
        }

        info!("💾 Persisting hot zone...");
        match host.shutdown().await {
            Ok(true) => info!("✅ Hot zone persisted"),
            Ok(false) => warn!("⚠️ Final save failed, the last autosave is the newest state on disk"),
            Err(e) => error!("❌ Zone host was already gone: {}", e),
        }

        match tokio::time::timeout(Duration::from_secs(8), host_task).await {
            Ok(Ok(_)) => info!("✅ Zone host stopped"),
            Ok(Err(e)) => error!("❌ Zone host task failed: {}", e),
            Err(_) => warn!("⏰ Zone host did not stop within timeout"),
        }

        log_final_statistics(&self.store);
        info!("✅ Zone Server shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🗺️ Start zone: {}", self.config.world.start_zone);
        info!("  🏷️ Instance: {}", self.config.world.instance_id);
        info!("  🚪 Portals: {}", self.portals.len());
        info!(
            "  💾 Persistence: {:?} ({})",
            self.config.persistence.backend, self.config.persistence.directory
        );
        match self.config.autosave_interval() {
            Some(interval) => info!("  ⏱️ Autosave every {:?}", interval),
            None => info!("  ⏱️ Autosave disabled"),
        }
    }
}

fn log_final_statistics(store: &PersistenceStore) {
    let stats = store.stats();
    info!("📊 Final Statistics:");
    info!("  - Stored zones: {}", stats.zone_count);
    info!("  - Stored objects: {}", stats.total_objects);
    for zone in &stats.zones {
        info!(
            "  - {}: {}/{} active, {} players",
            zone.zone_id, zone.active_objects, zone.object_count, zone.player_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn application(dir: &TempDir, extra_args: &[&str]) -> Application {
        let config_path = dir.path().join("config.toml");
        let data_dir = dir.path().join("zones");
        let mut argv = vec![
            "zone_server".to_string(),
            "--config".to_string(),
            config_path.to_string_lossy().to_string(),
            "--data-dir".to_string(),
            data_dir.to_string_lossy().to_string(),
        ];
        argv.extend(extra_args.iter().map(|s| s.to_string()));
        let args = CliArgs::try_parse_from(argv).unwrap();
        Application::new(args).await.unwrap()
    }

    #[tokio::test]
    async fn test_new_applies_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let app = application(&dir, &["--zone", "caves", "-l", "warn"]).await;

        assert_eq!(app.config.world.start_zone, "caves");
        assert_eq!(app.config.logging.level, "warn");
        assert!(app.config.persistence.directory.ends_with("zones"));
        assert!(dir.path().join("config.toml").exists());
    }

    #[tokio::test]
    async fn test_unknown_start_zone_is_rejected() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs::try_parse_from([
            "zone_server",
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "--zone",
            "atlantis",
        ])
        .unwrap();
        assert!(Application::new(args).await.is_err());
    }

    const ARENA_TABLE: &str = r#"
default_zone = "arena"

[zones.arena]
name = "Arena"
width = 800.0
height = 600.0

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
"#;

    fn write_config(dir: &TempDir, zone_table: &str) {
        let table_path = dir.path().join("zones.toml");
        std::fs::write(&table_path, zone_table).unwrap();

        let mut config = AppConfig::default();
        config.world.start_zone = "arena".to_string();
        config.world.zone_table = Some(table_path.to_string_lossy().to_string());
        config.persistence.backend = crate::config::BackendKind::Memory;
        std::fs::write(dir.path().join("config.toml"), toml::to_string_pretty(&config).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_custom_zone_table_brings_its_portals() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, ARENA_TABLE);
        let app = application(&dir, &[]).await;
        assert_eq!(app.portals.len(), 1);

        let mut zones = app.orchestrator();
        zones.enter_zone(&ZoneId::new("arena")).unwrap();
        let portal = zones.portal_at(zone_state::Position::new(780.0, 300.0)).unwrap();
        assert_eq!(portal.target_zone, ZoneId::new("pit"));
        assert!(zones.portal_at(zone_state::Position::new(1150.0, 450.0)).is_none());
    }

    #[tokio::test]
    async fn test_portals_to_unknown_zones_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, &ARENA_TABLE.replace("target_zone = \"pit\"", "target_zone = \"town\""));
        let args = CliArgs::try_parse_from([
            "zone_server",
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
        ])
        .unwrap();

        let err = Application::new(args).await.err().unwrap();
        assert!(err.to_string().contains("unknown zone 'town'"));
    }

    #[tokio::test]
    async fn test_force_regenerate_command() {
        let dir = TempDir::new().unwrap();
        let app = application(&dir, &["--force-regenerate"]).await;
        let store = app.store.clone();
        app.run().await.unwrap();

        assert_eq!(store.zone_ids(), vec![ZoneId::new("town")]);
        assert!(dir.path().join("zones").join("town.json").exists());

        let reopened = application(&dir, &["--stats"]).await;
        assert_eq!(reopened.store.stats().zone_count, 1);
        reopened.run().await.unwrap();
    }
}
