//! Cache client interface used by higher-level caches (PAT scopes).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Kept independent from `AppError` so callers decide how to fail: the scope
/// cache falls back to the store on reads and fails the request on
/// invalidation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal, set-oriented cache interface.
///
/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    // Add members to a set. Returns the number of members newly added.
    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    // Remove members from a set. Returns the number of members removed.
    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64>;

    async fn set_is_member(&self, key: &str, member: &str) -> CacheResult<bool>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    // Set a TTL on an existing key. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    // Delete keys. Returns number of deleted keys.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;
}

/// Convenience helper to build a TTL from seconds.
pub fn ttl_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}
