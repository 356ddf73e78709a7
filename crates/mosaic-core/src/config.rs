//! Bridge configuration.
//!
//! The configuration is plain data owned by the [`Bridge`](crate::Bridge).
//! It deserializes from TOML with every field optional:
//!
//! ```
//! use mosaic_core::config::{BridgeConfig, ErrorPolicy};
//!
//! let config = BridgeConfig::from_toml_str(r#"
//! error_policy = "abort"
//! max_emit_depth = 16
//! "#).unwrap();
//! assert_eq!(config.error_policy, ErrorPolicy::Abort);
//! assert_eq!(config.max_emit_depth, 16);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default limit on nested signal emissions.
pub const DEFAULT_MAX_EMIT_DEPTH: usize = 64;

/// What an emission does when a callback returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Report the error and keep invoking the remaining callbacks.
    #[default]
    Continue,
    /// Report the error and stop the emission, returning the error.
    Abort,
}

/// Errors loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for this schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime options of the object bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Callback error handling during emission.
    pub error_policy: ErrorPolicy,
    /// Maximum nesting of emissions triggered from callbacks.
    pub max_emit_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            max_emit_depth: DEFAULT_MAX_EMIT_DEPTH,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
