//! Error types for Pennant operations

use crate::EntityKind;
use thiserror::Error;

/// Record store errors. Always fatal for the in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Query failed for {kind}: {reason}")]
    QueryFailed { kind: EntityKind, reason: String },

    #[error("Could not decode {kind} row: {reason}")]
    RowDecode { kind: EntityKind, reason: String },
}

/// Key-value cache errors. Recovered locally by the repository.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },
}

/// A store row was handed to an entity type that has no conversion for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Don't know how to convert a {row_kind} row into {target}")]
pub struct ConversionError {
    pub row_kind: EntityKind,
    pub target: EntityKind,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &str, value: &str, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Master error type for all Pennant errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PennantError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request was cancelled before the lookup completed")]
    Cancelled,

    #[error("Lookup timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Batch source returned {got} results for {expected} keys")]
    BatchMismatch { expected: usize, got: usize },
}

/// Result type alias for Pennant operations.
pub type PennantResult<T> = Result<T, PennantError>;
