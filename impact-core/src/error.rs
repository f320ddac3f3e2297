//! Error types for impact metrics operations

use thiserror::Error;

/// Source-of-record failures.
///
/// These are the only errors allowed to fail a metrics read or a refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query failed for {operation}: {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Connection to source of record failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Connection pool exhausted: {reason}")]
    PoolExhausted { reason: String },

    #[error("Invalid snapshot returned for {scope}: {reason}")]
    InvalidSnapshot { scope: String, reason: String },
}

/// Cache layer failures. Absorbed by the metrics service on every read path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {reason}")]
    Connection { reason: String },

    #[error("Cache operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cache transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Failed to serialize cache value for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize cache value for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Cache I/O error: {reason}")]
    Io { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Negative value for {field}: {value}")]
    NegativeValue { field: String, value: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all impact errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImpactError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for impact operations.
pub type ImpactResult<T> = Result<T, ImpactError>;

// =============================================================================
// TESTS
// =============================================================================
