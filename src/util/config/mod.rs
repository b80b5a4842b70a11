//! Runtime configuration
//!
//! Tunables for the execution engine, passed explicitly to the office builder.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Values set on the struct by the caller
//! 2. Environment variables (OFFICEFLOOR_*)
//! 3. Configuration file (officefloor.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```
//! use officefloor::util::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str("asset_poll_interval_ms = 5").unwrap();
//! assert_eq!(config.asset_poll_interval_ms, 5);
//! assert!(config.inline_same_team);
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;


/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "officefloor.toml";

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Continue inline when the next function runs on the same team
    #[serde(default = "default_inline_same_team")]
    pub inline_same_team: bool,
    /// Period of the asset monitor's timeout check
    #[serde(default = "default_asset_poll_interval_ms")]
    pub asset_poll_interval_ms: u64,
    /// Timeout for asynchronous managed object sourcing
    #[serde(default = "default_object_timeout_ms")]
    pub default_object_timeout_ms: u64,
    /// Timeout for asynchronous flows
    #[serde(default = "default_flow_timeout_ms")]
    pub default_flow_timeout_ms: u64,
    /// Workers of an executor team declared without a size
    #[serde(default = "default_team_workers")]
    pub default_team_workers: usize,
    /// Inline steps before a chain is re-queued to its own team
    #[serde(default = "default_max_inline_steps")]
    pub max_inline_steps: usize,
}

fn default_inline_same_team() -> bool {
    true
}

fn default_asset_poll_interval_ms() -> u64 {
    10
}

fn default_object_timeout_ms() -> u64 {
    30_000
}

fn default_flow_timeout_ms() -> u64 {
    30_000
}

fn default_team_workers() -> usize {
    1
}

fn default_max_inline_steps() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inline_same_team: default_inline_same_team(),
            asset_poll_interval_ms: default_asset_poll_interval_ms(),
            default_object_timeout_ms: default_object_timeout_ms(),
            default_flow_timeout_ms: default_flow_timeout_ms(),
            default_team_workers: default_team_workers(),
            max_inline_steps: default_max_inline_steps(),
        }
    }
}

impl RuntimeConfig {
    /// Parse from TOML text (missing keys take their defaults)
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override fields from `OFFICEFLOOR_*` environment variables
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from the given variable lookup
    pub fn apply_vars<F>(
        mut self,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("OFFICEFLOOR_INLINE_SAME_TEAM") {
            self.inline_same_team = parse_var("OFFICEFLOOR_INLINE_SAME_TEAM", &value)?;
        }
        if let Some(value) = lookup("OFFICEFLOOR_ASSET_POLL_MS") {
            self.asset_poll_interval_ms = parse_var("OFFICEFLOOR_ASSET_POLL_MS", &value)?;
        }
        if let Some(value) = lookup("OFFICEFLOOR_OBJECT_TIMEOUT_MS") {
            self.default_object_timeout_ms = parse_var("OFFICEFLOOR_OBJECT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("OFFICEFLOOR_FLOW_TIMEOUT_MS") {
            self.default_flow_timeout_ms = parse_var("OFFICEFLOOR_FLOW_TIMEOUT_MS", &value)?;
        }
        Ok(self)
    }

    /// Asset monitor poll interval
    #[inline]
    pub fn asset_poll_interval(&self) -> Duration {
        Duration::from_millis(self.asset_poll_interval_ms.max(1))
    }

    /// Default asynchronous object timeout
    #[inline]
    pub fn default_object_timeout(&self) -> Duration {
        Duration::from_millis(self.default_object_timeout_ms)
    }

    /// Default asynchronous flow timeout
    #[inline]
    pub fn default_flow_timeout(&self) -> Duration {
        Duration::from_millis(self.default_flow_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// Load configuration from a file, falling back to defaults when it does not exist
pub fn load_runtime_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    let content = fs::read_to_string(path)?;
    RuntimeConfig::from_toml_str(&content)
}

/// Save configuration to a file
pub fn save_runtime_config(
    config: &RuntimeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Rejected value
        value: String,
    },
}
