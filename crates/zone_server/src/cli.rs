//! Command-line interface handling for the zone server.
//!
//! This module provides command-line argument parsing using the `clap`
//! crate. Besides the usual configuration overrides it exposes two
//! administrative modes that run once and exit: `--stats` and
//! `--force-regenerate`.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the start zone
    pub start_zone: Option<String>,
    /// Optional override for the snapshot directory
    pub data_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Print persistence statistics as JSON and exit
    pub stats: bool,
    /// Wipe every stored zone, regenerate the start zone and exit
    pub force_regenerate: bool,
}

impl CliArgs {
    /// Builds the clap command describing every option.
    pub fn command() -> Command {
        Command::new("Zone Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Authoritative zone state server with persistent zones and portals")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("zone")
                    .short('z')
                    .long("zone")
                    .value_name("ZONE")
                    .help("Zone to load at startup (overrides world.start_zone)"),
            )
            .arg(
                Arg::new("data-dir")
                    .short('d')
                    .long("data-dir")
                    .value_name("DIR")
                    .help("Zone snapshot directory (overrides persistence.directory)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("stats")
                    .long("stats")
                    .help("Print stored zone statistics as JSON and exit")
                    .action(clap::ArgAction::SetTrue)
                    .conflicts_with("force-regenerate"),
            )
            .arg(
                Arg::new("force-regenerate")
                    .long("force-regenerate")
                    .help("Delete every stored zone, regenerate the start zone and exit")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            start_zone: matches.get_one::<String>("zone").cloned(),
            data_dir: matches.get_one::<String>("data-dir").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            stats: matches.get_flag("stats"),
            force_regenerate: matches.get_flag("force-regenerate"),
        }
    }

    /// Whether the invocation runs a one-shot administrative command.
    pub fn is_admin_command(&self) -> bool {
        self.stats || self.force_regenerate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["zone_server"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.start_zone.is_none());
        assert!(args.data_dir.is_none());
        assert!(!args.json_logs);
        assert!(!args.is_admin_command());
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "zone_server",
            "--config",
            "prod.toml",
            "-z",
            "forest",
            "--data-dir",
            "/var/lib/zones",
            "-l",
            "debug",
            "--json-logs",
            "--stats",
        ])
        .unwrap();

        assert_eq!(args.config_path, PathBuf::from("prod.toml"));
        assert_eq!(args.start_zone.as_deref(), Some("forest"));
        assert_eq!(args.data_dir, Some(PathBuf::from("/var/lib/zones")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.stats);
        assert!(args.is_admin_command());
    }

    #[test]
    fn test_admin_commands_conflict() {
        assert!(CliArgs::try_parse_from(["zone_server", "--stats", "--force-regenerate"]).is_err());
    }
}
