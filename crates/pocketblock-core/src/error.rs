//! Core error types for pocketblock-core.
//!
//! Errors that can reach a caller are modelled with thiserror. Gateway
//! failures are deliberately *not* propagated out of the enforcement path;
//! they are logged and kept for diagnostics instead.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for pocketblock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shared or local storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Enforcement platform errors
    #[error("Enforcement error: {0}")]
    Gateway(#[from] GatewayError),

    /// Temporary unblock errors
    #[error("Unblock error: {0}")]
    Unblock(#[from] UnblockError),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the store
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Store cannot be written right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded for storage
    #[error("Failed to encode value for '{key}': {message}")]
    Encode { key: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to determine the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Hour or minute out of range
    #[error("Invalid clock time {hour:02}:{minute:02}: hour must be 0-23 and minute 0-59")]
    InvalidClockTime { hour: u32, minute: u32 },

    /// Text could not be parsed as HH:MM
    #[error("Cannot parse '{0}' as HH:MM")]
    UnparsableClockTime(String),

    /// No schedule with the given id
    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },
}

/// Errors reported by the enforcement platform or its companion services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The platform refused (authorization missing or revoked)
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The platform ran out of monitors, timers or similar resources
    #[error("Platform quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other platform failure
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Temporary-unblock errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnblockError {
    /// An override is running and the policy rejects a second one
    #[error("An unblock is already active until {until}")]
    AlreadyActive { until: chrono::DateTime<chrono::Utc> },

    /// Zero, negative or longer than the allowed maximum
    #[error("Unblock duration must be between 1s and {max_secs}s, got {secs}s")]
    InvalidDuration { secs: i64, max_secs: i64 },

    /// No override is running
    #[error("No unblock is active")]
    NotActive,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
