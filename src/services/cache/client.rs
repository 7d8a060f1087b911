//! Cache backend interface used by `CacheRegion`.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Kept independent from `AppError` so callers choose how to fail: a failed read
/// falls through to the loader, a failed invalidation is reported loudly.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// A minimal string-valued store with per-entry TTL.
///
/// Payloads are opaque strings (the region serializes to JSON). Implementations
/// must never return an entry older than the TTL it was stored with.
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    // Store (or overwrite) `value` under `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Delete keys. Returns number of deleted keys.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;
}
