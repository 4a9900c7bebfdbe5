//! Cache error types.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by regions and the registry.
///
/// Store failures are never folded into a cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The underlying store failed or is unreachable.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A key or value could not be serialized, or a stored value could not be read back.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Region names must be non-empty.
    #[error("Invalid region name: {0:?}")]
    InvalidRegionName(String),

    /// A bounded lock wait gave up while a clear was still in progress.
    #[error("Timed out after {waited:?} waiting for clear of region '{region}'")]
    LockWaitTimeout { region: String, waited: Duration },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
