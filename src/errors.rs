//! Error types for the yield service
//!
//! Each failure class of the service has its own error struct carrying a
//! message plus optional context, and all of them fold into [`ApyError`].
//! Errors are `Clone` because a single refresh failure is handed to every
//! caller that was waiting on that refresh.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Upstream Errors
// =============================================================================

/// Error when the chain data source is unreachable, fails, or times out
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Upstream fetch error: {message}")]
pub struct UpstreamFetchError {
    /// Detailed error message
    pub message: String,
    /// The network endpoint that was queried
    pub endpoint: Option<String>,
    /// Whether the fetch was abandoned because it exceeded its time bound
    pub timed_out: bool,
}

impl UpstreamFetchError {
    /// Create a new upstream fetch error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            endpoint: None,
            timed_out: false,
        }
    }

    /// Create a new upstream fetch error for a given endpoint
    pub fn with_endpoint(message: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            endpoint: Some(endpoint.into()),
            timed_out: false,
        }
    }

    /// Create an error for a fetch that exceeded its time bound
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            endpoint: None,
            timed_out: true,
        }
    }
}

// =============================================================================
// Data Errors
// =============================================================================

/// Error when a raw chain record is malformed
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Data integrity error: {message}")]
pub struct DataIntegrityError {
    /// Detailed error message
    pub message: String,
    /// Identifier of the offending record (hotkey or netuid)
    pub record: Option<String>,
    /// Name of the offending field
    pub field: Option<String>,
}

impl DataIntegrityError {
    /// Create a new data integrity error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            record: None,
            field: None,
        }
    }

    /// Create a new data integrity error naming the record and field
    pub fn with_field(
        message: impl Into<String>,
        record: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            record: Some(record.into()),
            field: Some(field.into()),
        }
    }
}

/// Error when a requested validator or subnet does not exist
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Not found: {message}")]
pub struct NotFoundError {
    /// Detailed error message
    pub message: String,
    /// Kind of entity looked up ("validator", "subnet", "resource")
    pub kind: Option<String>,
    /// Identifier that was looked up
    pub id: Option<String>,
}

impl NotFoundError {
    /// Create a new not found error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            id: None,
        }
    }

    /// Create a new not found error for an entity kind and id
    pub fn entity(kind: impl Into<String>, id: impl Into<String>) -> Self {
        let kind = kind.into();
        let id = id.into();
        Self {
            message: format!("{} {} not found", kind, id),
            kind: Some(kind),
            id: Some(id),
        }
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Error when query parameters are malformed
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    /// Detailed error message
    pub message: String,
    /// The offending parameter
    pub parameter: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            parameter: None,
        }
    }

    /// Create a new validation error naming the parameter
    pub fn with_parameter(message: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            parameter: Some(parameter.into()),
        }
    }
}

/// Error when an administrative call is not authenticated
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Unauthorized: {message}")]
pub struct UnauthorizedError {
    /// Detailed error message
    pub message: String,
}

impl UnauthorizedError {
    /// Create a new unauthorized error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Error when the metadata store cannot be read or written
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[error("Metadata store error: {message}")]
pub struct MetadataStoreError {
    /// Detailed error message
    pub message: String,
    /// Backing file path if the store is file based
    pub path: Option<String>,
}

impl MetadataStoreError {
    /// Create a new metadata store error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Create a new metadata store error with the backing path
    pub fn with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// Unified error type for the yield service
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
pub enum ApyError {
    #[error(transparent)]
    Upstream(#[from] UpstreamFetchError),
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedError),
    #[error(transparent)]
    MetadataStore(#[from] MetadataStoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ApyError {
    fn from(err: std::io::Error) -> Self {
        ApyError::MetadataStore(MetadataStoreError::new(err.to_string()))
    }
}

impl From<serde_json::Error> for ApyError {
    fn from(err: serde_json::Error) -> Self {
        ApyError::Internal(format!("JSON error: {}", err))
    }
}

/// Result type alias for yield service operations
pub type ApyResult<T> = Result<T, ApyError>;

impl ApyError {
    /// Create an internal error from any displayable error
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApyError::Internal(err.to_string())
    }

    /// Check if this is an upstream fetch error
    pub fn is_upstream(&self) -> bool {
        matches!(self, ApyError::Upstream(_))
    }

    /// Check if this is a data integrity error
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, ApyError::DataIntegrity(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApyError::NotFound(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, ApyError::Validation(_))
    }

    /// Message without the error kind prefix, as shown to API clients
    pub fn message(&self) -> &str {
        match self {
            ApyError::Upstream(e) => &e.message,
            ApyError::DataIntegrity(e) => &e.message,
            ApyError::NotFound(e) => &e.message,
            ApyError::Validation(e) => &e.message,
            ApyError::Unauthorized(e) => &e.message,
            ApyError::MetadataStore(e) => &e.message,
            ApyError::Internal(message) => message,
        }
    }

    /// HTTP status code this error maps to
    pub fn http_status(&self) -> u16 {
        match self {
            ApyError::Upstream(_) => 503,
            ApyError::NotFound(_) => 404,
            ApyError::Validation(_) => 400,
            ApyError::Unauthorized(_) => 401,
            ApyError::DataIntegrity(_) | ApyError::MetadataStore(_) | ApyError::Internal(_) => 500,
        }
    }

    /// Stable machine readable code, in the tRPC error code vocabulary
    pub fn code(&self) -> &'static str {
        match self {
            ApyError::Upstream(_) => "SERVICE_UNAVAILABLE",
            ApyError::DataIntegrity(_) => "DATA_INTEGRITY",
            ApyError::NotFound(_) => "NOT_FOUND",
            ApyError::Validation(_) => "BAD_REQUEST",
            ApyError::Unauthorized(_) => "UNAUTHORIZED",
            ApyError::MetadataStore(_) | ApyError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}
