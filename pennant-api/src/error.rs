//! Error Types for Pennant API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - ErrorExtensions implementation so resolvers report a `code`
//!
//! HTTP errors are serialized as JSON with appropriate status codes. GraphQL
//! field errors carry the same code in their `extensions`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pennant_core::{ConfigError, PennantError, StoreError};
use pennant_storage::LmdbCacheError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Configuration value is missing or malformed
    InvalidConfig,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Record store operation failed
    DatabaseError,

    /// Cache backend could not be opened
    CacheError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Request was cancelled before it completed
    Cancelled,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::ServiceUnavailable | ErrorCode::Cancelled => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InvalidConfig
            | ErrorCode::InternalError
            | ErrorCode::DatabaseError
            | ErrorCode::CacheError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidConfig => "Invalid configuration",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::CacheError => "Cache backend unavailable",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::Cancelled => "Request cancelled",
            ErrorCode::Timeout => "Operation timed out",
        }
    }

    /// Wire name, as used in JSON bodies and GraphQL error extensions.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn cancelled() -> Self {
        Self::from_code(ErrorCode::Cancelled)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// GRAPHQL INTEGRATION
// ============================================================================

/// Field errors carry `extensions.code` so clients can tell a timeout from a
/// store outage without parsing messages.
impl async_graphql::ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.code.as_str();
        async_graphql::Error::new(self.message.clone()).extend_with(|_, e| e.set("code", code))
    }
}

/// Convert a domain error into a GraphQL field error.
pub fn gql_error(err: PennantError) -> async_graphql::Error {
    use async_graphql::ErrorExtensions;
    ApiError::from(err).extend()
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<PennantError> for ApiError {
    fn from(err: PennantError) -> Self {
        match err {
            PennantError::Store(StoreError::Connection { reason }) => {
                tracing::error!(%reason, "Record store unreachable");
                ApiError::service_unavailable("Record store unavailable")
            }
            PennantError::Store(e) => {
                tracing::error!(error = %e, "Record store error");
                // Generic message to avoid leaking internal details
                ApiError::database_error("Database operation failed")
            }
            PennantError::Cache(e) => ApiError::new(ErrorCode::CacheError, e.to_string()),
            PennantError::Conversion(e) => ApiError::internal_error(e.to_string()),
            PennantError::Config(e) => ApiError::from(e),
            PennantError::Cancelled => ApiError::cancelled(),
            PennantError::Timeout { after_ms } => ApiError::new(
                ErrorCode::Timeout,
                format!("Data fetch timed out after {}ms", after_ms),
            ),
            PennantError::BatchMismatch { expected, got } => ApiError::internal_error(format!(
                "Batch source returned {} results for {} keys",
                got, expected
            )),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::InvalidConfig, err.to_string())
    }
}

impl From<LmdbCacheError> for ApiError {
    fn from(err: LmdbCacheError) -> Self {
        tracing::error!(error = %err, "LMDB cache error");
        ApiError::new(ErrorCode::CacheError, err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::ErrorExtensions;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_wire_names_match_serde() -> Result<(), serde_json::Error> {
        for code in [
            ErrorCode::InvalidInput,
            ErrorCode::InvalidConfig,
            ErrorCode::InternalError,
            ErrorCode::DatabaseError,
            ErrorCode::CacheError,
            ErrorCode::ServiceUnavailable,
            ErrorCode::Cancelled,
            ErrorCode::Timeout,
        ] {
            assert_eq!(serde_json::to_string(&code)?, format!("\"{}\"", code.as_str()));
        }
        Ok(())
    }

    #[test]
    fn test_domain_error_mapping() {
        let err = ApiError::from(PennantError::Timeout { after_ms: 250 });
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.message.contains("250"));

        let err = ApiError::from(PennantError::Cancelled);
        assert_eq!(err.code, ErrorCode::Cancelled);

        let err = ApiError::from(PennantError::Store(StoreError::QueryFailed {
            kind: pennant_core::EntityKind::Event,
            reason: "relation does not exist".into(),
        }));
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("relation"));
    }

    #[test]
    fn test_graphql_extension_carries_code() {
        let gql = ApiError::timeout("graphql").extend();
        let code = gql
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("TIMEOUT")));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::invalid_input("first must not be negative");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("INVALID_INPUT"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
