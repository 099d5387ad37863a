//! Registry module error types.

use thiserror::Error;

/// Errors that can occur in the service registry module.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A configured registry endpoint could not be parsed.
    #[error("invalid registry endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The offending endpoint string.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry configuration names no endpoints at all.
    #[error("registry configuration has no endpoints")]
    NoEndpoints,
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
