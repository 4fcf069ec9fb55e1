//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache providers and the connection pool.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The connection pool has been closed
    #[error("Connection pool is closed")]
    PoolUnavailable,

    /// Every pooled connection is in use
    #[error("Pool has no available resources at this time: {0}")]
    PoolExhausted(String),

    /// A borrowed connection is not connected, or was reclaimed by the auditor
    #[error("Pool resource is not connected")]
    DeadResource,

    /// The underlying pool did not hand out a connection
    #[error("Failed to get resource from pool: {0}")]
    BorrowFailed(String),

    /// A command was still pending when the borrow's deadline passed
    #[error("Command did not complete before the resource deadline")]
    CommandTimeout,

    /// Update of a key that holds no element
    #[error("No element for key \"{0}\"")]
    MissingKey(String),

    /// A remote key that does not belong to the keyspace
    #[error("Key \"{0}\" is outside of the keyspace")]
    ForeignKey(String),

    /// A key or value could not be converted to or from its wire form
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Fault reported by the Redis client
    #[error("Redis error: {0}")]
    Remote(#[from] redis::RedisError),

    /// Invalid or incomplete provider configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl CacheError {
    // == Pool Fault ==
    /// Returns true for failures raised while borrowing from the pool.
    pub fn is_pool_fault(&self) -> bool {
        matches!(
            self,
            CacheError::PoolUnavailable
                | CacheError::PoolExhausted(_)
                | CacheError::DeadResource
                | CacheError::BorrowFailed(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
