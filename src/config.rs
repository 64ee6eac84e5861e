//! Decode and session configuration
//!
//! `DecodeConfig` controls how much of the tracee's memory is read and how
//! verbose decoded arguments are. It can come from a TOML file, CLI flags, or
//! both (flags win).

use crate::error::ConfigError;
use crate::filter::SyscallFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on `string_max_length`
pub const STRING_MAX_LENGTH_LIMIT: usize = 64 * 1024;
/// Upper bound on `max_array_count`
pub const MAX_ARRAY_COUNT_LIMIT: usize = 4096;

/// Argument decoding options
///
/// Construct with [`DecodeConfig::default`] or [`DecodeConfig::from_toml_file`]
/// and call [`DecodeConfig::validate`] before handing it to the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    /// Maximum bytes read for a string argument
    pub string_max_length: usize,
    /// Maximum elements read for an array argument
    pub max_array_count: usize,
    /// Prefix arguments with their C type
    pub include_types: bool,
    /// Show the raw pointer next to decoded string/array content
    pub include_addresses: bool,
    /// Prefix arguments with their parameter name
    pub include_argument_names: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            string_max_length: 256,
            max_array_count: 20,
            include_types: true,
            include_addresses: true,
            include_argument_names: true,
        }
    }
}

impl DecodeConfig {
    /// Check the numeric bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.string_max_length == 0 || self.string_max_length > STRING_MAX_LENGTH_LIMIT {
            return Err(ConfigError::StringMaxLength {
                max: STRING_MAX_LENGTH_LIMIT,
                actual: self.string_max_length,
            });
        }
        if self.max_array_count == 0 || self.max_array_count > MAX_ARRAY_COUNT_LIMIT {
            return Err(ConfigError::MaxArrayCount {
                max: MAX_ARRAY_COUNT_LIMIT,
                actual: self.max_array_count,
            });
        }
        Ok(())
    }

    /// True when [`validate`](Self::validate) would succeed
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }
}

/// Session-level options used by the binary
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub decode: DecodeConfig,
    pub filter: SyscallFilter,
    /// Parent directory for per-session log directories
    pub log_dir: PathBuf,
    /// Echo human lines to stderr
    pub console: bool,
    /// Print a per-syscall summary after detaching
    pub summary: bool,
    /// Cancel the session automatically after this long
    pub duration: Option<Duration>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            decode: DecodeConfig::default(),
            filter: SyscallFilter::all(),
            log_dir: PathBuf::from("logs"),
            console: true,
            summary: false,
            duration: None,
        }
    }
}
