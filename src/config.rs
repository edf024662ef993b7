//! Layered server configuration (§6, §10.3).
//!
//! CLI flags (via `clap`) merged over an optional `--config=<path>` JSON
//! file merged over built-in defaults, CLI taking precedence.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::utils::constants::DEFAULT_HTTP_PORT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// The subset of `ServerConfig` a `--config=<path>` JSON file may override.
/// Every field is optional so a partial file only overrides what it sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub headless: Option<bool>,
    pub http: Option<bool>,
    pub port: Option<u16>,
    pub log_level: Option<LogLevel>,
    pub log_dir: Option<PathBuf>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub slow_motion_ms: Option<u64>,
    pub allowed_paths: Option<Vec<PathBuf>>,
    pub deny_paths: Option<Vec<PathBuf>>,
    pub restrict_to_workdir: Option<bool>,
    pub allow_temp: Option<bool>,
    pub max_file_size: Option<u64>,
    pub daemon: Option<bool>,
    pub pid_file: Option<PathBuf>,
}

/// CLI flags, per §6. `--config` is consumed separately since it names the
/// file that supplies the rest of the layer.
#[derive(Debug, Parser)]
#[command(name = "browservisor", version, about = "MCP tool server driving a supervised Chromium instance over CDP")]
pub struct CliArgs {
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    #[arg(long)]
    pub http: bool,

    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1920)]
    pub window_width: u32,

    #[arg(long, default_value_t = 1080)]
    pub window_height: u32,

    /// Inter-action delay in milliseconds, for visible-mode demos.
    #[arg(long, default_value_t = 0)]
    pub slow_motion: u64,

    #[arg(long, value_delimiter = ',')]
    pub allowed_paths: Vec<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    pub deny_paths: Vec<PathBuf>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub restrict_to_workdir: bool,

    #[arg(long, default_value_t = false)]
    pub allow_temp: bool,

    #[arg(long, default_value_t = 0)]
    pub max_file_size: u64,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub daemon: bool,

    #[arg(long)]
    pub pid_file: Option<PathBuf>,
}

/// Fully resolved server configuration: CLI layered over config file
/// layered over defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub headless: bool,
    pub http: bool,
    pub port: u16,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub slow_motion: Duration,
    pub allowed_paths: Vec<PathBuf>,
    pub deny_paths: Vec<PathBuf>,
    pub restrict_to_workdir: bool,
    pub allow_temp: bool,
    pub max_file_size: u64,
    pub daemon: bool,
    pub pid_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Build the resolved config: defaults set by `CliArgs`'s `default_value`s,
    /// overridden by an optional `--config` JSON file, overridden again by
    /// any CLI flag the user actually passed. clap doesn't distinguish
    /// "explicitly passed" from "default" once parsed, so this takes the
    /// simpler, explicit-in-the-source-of-truth approach: CLI flags win
    /// whenever they differ from the hardcoded default, and the config file
    /// fills in everything else.
    pub fn resolve(args: CliArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
                serde_json::from_str::<ConfigFile>(&contents)
                    .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?
            }
            None => ConfigFile::default(),
        };

        Ok(Self {
            headless: args.headless,
            http: args.http || file.http.unwrap_or(false),
            port: if args.port != DEFAULT_HTTP_PORT {
                args.port
            } else {
                file.port.unwrap_or(args.port)
            },
            log_level: file.log_level.unwrap_or(args.log_level),
            log_dir: args.log_dir.or(file.log_dir),
            window_width: if args.window_width != 1920 {
                args.window_width
            } else {
                file.window_width.unwrap_or(args.window_width)
            },
            window_height: if args.window_height != 1080 {
                args.window_height
            } else {
                file.window_height.unwrap_or(args.window_height)
            },
            slow_motion: Duration::from_millis(
                if args.slow_motion != 0 {
                    args.slow_motion
                } else {
                    file.slow_motion_ms.unwrap_or(0)
                },
            ),
            allowed_paths: if !args.allowed_paths.is_empty() {
                args.allowed_paths
            } else {
                file.allowed_paths.unwrap_or_default()
            },
            deny_paths: if !args.deny_paths.is_empty() {
                args.deny_paths
            } else {
                file.deny_paths.unwrap_or_default()
            },
            restrict_to_workdir: file.restrict_to_workdir.unwrap_or(args.restrict_to_workdir),
            allow_temp: args.allow_temp || file.allow_temp.unwrap_or(false),
            max_file_size: if args.max_file_size != 0 {
                args.max_file_size
            } else {
                file.max_file_size.unwrap_or(0)
            },
            daemon: args.daemon || file.daemon.unwrap_or(false),
            pid_file: args.pid_file.or(file.pid_file),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_resolve_without_config_file() {
        let args = CliArgs::parse_from(["browservisor"]);
        let config = ServerConfig::resolve(args).unwrap();
        assert!(config.headless);
        assert_eq!(config.port, DEFAULT_HTTP_PORT);
        assert!(!config.http);
    }

    #[test]
    fn cli_flag_overrides_default() {
        let args = CliArgs::parse_from(["browservisor", "--port", "9999", "--http"]);
        let config = ServerConfig::resolve(args).unwrap();
        assert_eq!(config.port, 9999);
        assert!(config.http);
    }

    #[test]
    fn config_file_fills_in_when_cli_uses_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"port": 7000, "deny_paths": ["/etc"]}"#).unwrap();
        let args = CliArgs::parse_from(["browservisor", "--config", path.to_str().unwrap()]);
        let config = ServerConfig::resolve(args).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.deny_paths, vec![PathBuf::from("/etc")]);
    }

    #[test]
    fn allowed_paths_csv_parsing() {
        let args = CliArgs::parse_from(["browservisor", "--allowed-paths", "/a,/b,/c"]);
        let config = ServerConfig::resolve(args).unwrap();
        assert_eq!(config.allowed_paths.len(), 3);
    }
}
