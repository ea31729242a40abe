//! Error types for radio-alarm
//!
//! Store and player failures are not handled by the HTTP layer; they
//! propagate up and are rendered as a 500 response by `api`.

use thiserror::Error;

/// Main error type for radio-alarm
#[derive(Error, Debug)]
pub enum Error {
    /// Path into the persisted document does not resolve
    #[error("Config key not found: {0}")]
    KeyNotFound(String),

    /// Value at a path exists but has the wrong JSON type
    #[error("Config value at {path} is not a {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    /// Stored alarm time cannot form a wake window
    #[error("Invalid alarm time: {hour}:{min}")]
    InvalidAlarmTime { hour: u32, min: u32 },

    /// External player process could not be spawned
    #[error("Player launch failed: {0}")]
    PlayerLaunch(#[source] std::io::Error),

    /// Writing the persisted document failed
    #[error("Config persist failed: {0}")]
    Persist(#[source] std::io::Error),

    /// Encoding the persisted document failed
    #[error("Config serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Bootstrap configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using radio-alarm Error
pub type Result<T> = std::result::Result<T, Error>;
