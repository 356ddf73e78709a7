//! Error types for the window manager.

use std::time::Duration;

use mosaic_core::{BridgeError, ConfigError};

/// Errors raised by the window manager driver and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum WmError {
    /// A bridge operation failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The timer ID is invalid or has already been removed.
    #[error("invalid timer id")]
    InvalidTimerId,

    /// A timeout was not a positive, finite number of seconds.
    #[error("invalid timeout {0}: expected a positive number of seconds")]
    InvalidTimeout(f64),

    /// A timer interval reaches past the range of the clock.
    #[error("timer interval {0:?} is too far in the future")]
    TimerOverflow(Duration),

    /// The window manager side of the event channel is gone.
    #[error("event channel disconnected")]
    Disconnected,
}

/// Result type alias for window manager operations.
pub type Result<T> = std::result::Result<T, WmError>;
