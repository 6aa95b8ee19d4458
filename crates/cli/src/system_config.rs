//! User configuration for the `trefresh` binary
//!
//! Read from a TOML file with `[engine]` and `[logging]` tables. Missing
//! keys (or a missing default file) fall back to built-in defaults.

use anyhow::{Context, Result};
use refresh_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Accepted values for `logging.level`
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level; `-v` raises it to debug, `-vv` to trace (default: warn)
    pub level: String,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "logging.level must be one of {} (got {})",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }
        Ok(())
    }
}

/// Configuration together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SystemConfig,
    /// `None` when running on defaults
    pub source: Option<PathBuf>,
}

/// Default config file location: `<config_dir>/trefresh/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trefresh").join("config.toml"))
}

/// Load the configuration from `explicit`, else from the default location
/// if it exists, else use defaults
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_from(path)?;
        return Ok(LoadedConfig {
            config,
            source: Some(path.to_path_buf()),
        });
    }

    match config_file_path() {
        Some(path) if path.exists() => {
            let config = load_from(&path)?;
            Ok(LoadedConfig {
                config,
                source: Some(path),
            })
        }
        _ => Ok(LoadedConfig {
            config: SystemConfig::default(),
            source: None,
        }),
    }
}

/// Parse and validate one config file
pub fn load_from(path: &Path) -> Result<SystemConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SystemConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Example file with every key at its default
pub fn example_config() -> String {
    let defaults = EngineConfig::default();
    format!(
        r#"# trefresh configuration

[engine]
# Delay between the first wake-up and the start of a run (0-60000)
initial_delay_ms = {}
# Delay before re-running when changes arrived mid-run (0-60000)
reschedule_delay_ms = {}
# How often waiters re-check their repository (1-10000)
wait_poll_interval_ms = {}
# Run reports kept in memory (>= 1)
report_capacity = {}
# Notification channel capacity, 0 for unbounded
intake_capacity = {}

[logging]
# error, warn, info, debug or trace
level = "warn"
# file = "/tmp/trefresh.log"
"#,
        defaults.initial_delay_ms,
        defaults.reschedule_delay_ms,
        defaults.wait_poll_interval_ms,
        defaults.report_capacity,
        defaults.intake_capacity
    )
}
