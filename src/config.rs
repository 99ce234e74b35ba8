/*!
 * Runtime Configuration
 *
 * Defaults, presets, and environment/JSON overrides
 *
 * Environment variables:
 * - VFD_MAX_DESCRIPTORS: virtual descriptor limit (default: 1024)
 * - VFD_RESERVE_STDIO: pre-register descriptors 0-2 (default: true)
 * - VFD_INTERFACE_VERSION: interface version offered to the host VM
 * - VFD_TRACE_JSON: JSON tracing output (default: false)
 */

use crate::core::errors::ConfigError;
use crate::core::limits::{
    DEFAULT_INTERFACE_VERSION, MAX_CONFIGURABLE_DESCRIPTORS, RESTRICTED_MAX_DESCRIPTORS,
    STANDARD_MAX_DESCRIPTORS, STD_STREAM_COUNT,
};
use serde::{Deserialize, Serialize};

/// Descriptor table configuration
///
/// Only constructed through validated paths, so a config that reserves the
/// standard streams always has room for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTableConfig")]
pub struct TableConfig {
    /// Maximum number of live (or closing) virtual descriptors
    max_descriptors: usize,
    /// Map virtual 0, 1, 2 onto the process's standard streams
    reserve_std_streams: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_descriptors: STANDARD_MAX_DESCRIPTORS,
            reserve_std_streams: true,
        }
    }
}

impl TableConfig {
    /// Validated configuration
    pub fn new(max_descriptors: usize, reserve_std_streams: bool) -> Result<Self, ConfigError> {
        let config = Self {
            max_descriptors,
            reserve_std_streams,
        };
        config.validate()?;
        Ok(config)
    }

    /// Smaller limit for sandboxed embedders
    pub const fn restricted() -> Self {
        Self {
            max_descriptors: RESTRICTED_MAX_DESCRIPTORS,
            reserve_std_streams: true,
        }
    }

    /// Empty table with the given limit, no standard streams
    pub const fn bare(max_descriptors: usize) -> Self {
        Self {
            max_descriptors,
            reserve_std_streams: false,
        }
    }

    #[inline]
    pub const fn max_descriptors(&self) -> usize {
        self.max_descriptors
    }

    #[inline]
    pub const fn reserve_std_streams(&self) -> bool {
        self.reserve_std_streams
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let max = self.max_descriptors;
        if max == 0 || max > MAX_CONFIGURABLE_DESCRIPTORS {
            return Err(ConfigError::InvalidValue {
                key: "max_descriptors".to_string(),
                value: max.to_string(),
            });
        }
        if self.reserve_std_streams && max < STD_STREAM_COUNT as usize {
            return Err(ConfigError::InvalidValue {
                key: "reserve_std_streams".to_string(),
                value: format!("true with max_descriptors={}", max),
            });
        }
        Ok(())
    }
}

/// Wire form of [`TableConfig`], validated on conversion
#[derive(Deserialize)]
#[serde(default)]
struct RawTableConfig {
    max_descriptors: usize,
    reserve_std_streams: bool,
}

impl Default for RawTableConfig {
    fn default() -> Self {
        let defaults = TableConfig::default();
        Self {
            max_descriptors: defaults.max_descriptors,
            reserve_std_streams: defaults.reserve_std_streams,
        }
    }
}

impl TryFrom<RawTableConfig> for TableConfig {
    type Error = ConfigError;

    fn try_from(raw: RawTableConfig) -> Result<Self, Self::Error> {
        Self::new(raw.max_descriptors, raw.reserve_std_streams)
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub table: TableConfig,
    /// Interface version requested from the host VM on load
    pub interface_version: i32,
    /// Emit JSON tracing output
    pub trace_json: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            interface_version: DEFAULT_INTERFACE_VERSION,
            trace_json: false,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `VFD_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("VFD_MAX_DESCRIPTORS") {
            config.table.max_descriptors = parse_value("VFD_MAX_DESCRIPTORS", &value)?;
        }
        if let Some(value) = lookup("VFD_RESERVE_STDIO") {
            config.table.reserve_std_streams = parse_bool("VFD_RESERVE_STDIO", &value)?;
        }
        if let Some(value) = lookup("VFD_INTERFACE_VERSION") {
            config.interface_version = parse_version("VFD_INTERFACE_VERSION", &value)?;
        }
        if let Some(value) = lookup("VFD_TRACE_JSON") {
            config.trace_json = parse_bool("VFD_TRACE_JSON", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.table.validate()?;
        if self.interface_version <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "interface_version".to_string(),
                value: self.interface_version.to_string(),
            });
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

// Accepts decimal or 0x-prefixed hex
fn parse_version(key: &str, value: &str) -> Result<i32, ConfigError> {
    let trimmed = value.trim();
    match trimmed.strip_prefix("0x") {
        Some(hex) => i32::from_str_radix(hex, 16).map_err(|_| invalid(key, value)),
        None => parse_value(key, trimmed),
    }
}
