//! # Zone Server - Main Entry Point
//!
//! Hosts persistent game zones: loads the start zone, keeps its live
//! entities in sync with the stored records, autosaves, and persists
//! everything on shutdown.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! zone_server
//!
//! # Start in another zone with snapshots in a custom directory
//! zone_server --zone forest --data-dir /var/lib/zones
//!
//! # Inspect stored zones
//! zone_server --stats
//!
//! # Throw away every stored zone and regenerate the start zone
//! zone_server --force-regenerate
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM (Unix),
//! persisting the hot zone before exiting.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

pub mod service;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the zone server: CLI parsing, configuration, logging, then the
/// selected application mode.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{AppConfig as ServerConfig, AutosaveSettings, BackendKind, LoggingSettings, PersistenceSettings, WorldSettings};
pub use service::{ServiceError, ZoneHost};
