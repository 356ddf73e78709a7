//! Window manager configuration.
//!
//! ```
//! use mosaic::config::WmConfig;
//!
//! let config = WmConfig::from_toml_str(r#"
//! [bridge]
//! error_policy = "continue"
//!
//! [spawn]
//! timeout_secs = 5.0
//! "#).unwrap();
//! assert_eq!(config.spawn.timeout_secs, 5.0);
//! ```

use std::path::Path;
use std::time::Duration;

use mosaic_core::{BridgeConfig, ConfigError};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WmError};

/// Seconds a startup sequence may stay pending before it times out.
pub const DEFAULT_SPAWN_TIMEOUT_SECS: f64 = 20.0;

/// Startup-notification tracking options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub timeout_secs: f64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SPAWN_TIMEOUT_SECS,
        }
    }
}

impl SpawnConfig {
    /// The timeout as a duration.
    pub fn timeout(&self) -> Result<Duration> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(WmError::InvalidTimeout(self.timeout_secs));
        }
        Duration::try_from_secs_f64(self.timeout_secs)
            .map_err(|_| WmError::InvalidTimeout(self.timeout_secs))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WmConfig {
    pub bridge: BridgeConfig,
    pub spawn: SpawnConfig,
}

impl WmConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::from)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
