//! Access control error types.

use thiserror::Error;

/// Errors that can occur while building an access control engine.
#[derive(Debug, Error)]
pub enum RbacError {
    /// A CIDR range in a destination-IP predicate is malformed.
    #[error("invalid CIDR range: {0}")]
    InvalidCidr(String),

    /// An IP address string is malformed.
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// The engine configuration is structurally invalid.
    #[error("invalid access control configuration: {0}")]
    InvalidConfig(String),

    /// The JSON configuration could not be parsed.
    #[error("failed to parse access control configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for access control operations.
pub type RbacResult<T> = Result<T, RbacError>;
