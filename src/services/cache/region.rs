//! Read-through cache regions with explicit write invalidation.
//!
//! Consistency contract for callers: after `invalidate(key)` returns, the next
//! `get_or_load(key)` loads from the source. A load that was already in flight
//! when the invalidation happened is returned to its own caller but is not
//! stored (the region's invalidation epoch moved), so a stale value can survive
//! for at most that one in-flight read. Concurrent misses on the same key are
//! not deduplicated; each runs its own loader.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::clock::SharedClock;
use crate::services::cache::client::{CacheClient, CacheError};
use crate::services::cache::keys::{InvalidationSet, region_of};
use crate::services::cache::memory::MemoryClient;

const NAMESPACE: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl RegionConfig {
    pub fn new(max_entries: usize, ttl: Duration) -> Result<Self, CacheError> {
        if max_entries < 1 {
            return Err(CacheError::InvalidValue("max_entries must be >= 1".into()));
        }
        if ttl < Duration::from_secs(1) {
            return Err(CacheError::InvalidValue("ttl must be >= 1s".into()));
        }
        Ok(Self { max_entries, ttl })
    }
}

pub struct CacheRegion {
    name: &'static str,
    config: RegionConfig,
    client: Arc<dyn CacheClient>,
    // Bumped by every invalidation in this region.
    epoch: AtomicU64,
}

impl std::fmt::Debug for CacheRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegion")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("backend", &self.client.backend_name())
            .finish()
    }
}

impl CacheRegion {
    pub fn new(name: &'static str, config: RegionConfig, client: Arc<dyn CacheClient>) -> Self {
        Self {
            name,
            config,
            client,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn in_memory(name: &'static str, config: RegionConfig, clock: SharedClock) -> Self {
        let client = MemoryClient::new(config.max_entries, clock);
        Self::new(name, config, Arc::new(client))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn full_key(&self, key: &str) -> String {
        format!("{NAMESPACE}:{key}")
    }

    /// Return the cached value for `key`, or run `loader` and cache its result.
    ///
    /// Loader errors are returned unchanged and nothing is cached. Backend errors
    /// never fail the call: a broken read is a miss, a broken write is skipped.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let full_key = self.full_key(key);

        match self.client.get_string(&full_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(region = self.name, key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(region = self.name, key, error = %e, "undecodable cache entry; reloading");
                }
            },
            Ok(None) => {
                tracing::debug!(region = self.name, key, "cache miss");
            }
            Err(e) => {
                tracing::warn!(region = self.name, key, error = %e, "cache read failed; loading from source");
            }
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let value = loader().await?;

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!(region = self.name, key, "invalidated during load; not caching");
            return Ok(value);
        }

        let raw = match serde_json::to_string(&value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(region = self.name, key, error = %e, "cache value not serializable");
                return Ok(value);
            }
        };

        if let Err(e) = self
            .client
            .set_with_ttl(&full_key, &raw, self.config.ttl)
            .await
        {
            tracing::warn!(region = self.name, key, error = %e, "cache write failed");
            return Ok(value);
        }

        // An invalidation may have landed between the epoch check and the write.
        if self.epoch.load(Ordering::Acquire) != epoch {
            if let Err(e) = self.client.del(&[full_key]).await {
                tracing::warn!(region = self.name, key, error = %e, "failed to drop raced cache entry");
            }
        }

        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.invalidate_all([key]).await.map(|_| ())
    }

    /// Remove every given key. Returns the number of entries actually removed.
    pub async fn invalidate_all<I, S>(&self, keys: I) -> Result<u64, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let full_keys: Vec<String> = keys
            .into_iter()
            .map(|k| self.full_key(k.as_ref()))
            .collect();
        if full_keys.is_empty() {
            return Ok(0);
        }

        // Epoch first: loads that started before this point will not store.
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let removed = self.client.del(&full_keys).await?;

        tracing::debug!(region = self.name, keys = ?full_keys, removed, "cache invalidated");
        Ok(removed)
    }
}

/// Regions by name, used to route an `InvalidationSet` to the regions owning its keys.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    regions: HashMap<&'static str, Arc<CacheRegion>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, region: Arc<CacheRegion>) -> Self {
        self.regions.insert(region.name(), region);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CacheRegion>> {
        self.regions.get(name)
    }

    /// Invalidate all keys of `set`. Every region is attempted; the first error is returned.
    pub async fn invalidate(&self, set: &InvalidationSet) -> Result<u64, CacheError> {
        let mut by_region: HashMap<&str, Vec<&str>> = HashMap::new();
        for key in set.iter() {
            by_region.entry(region_of(key)).or_default().push(key);
        }

        let mut removed = 0;
        let mut first_error = None;

        for (name, keys) in by_region {
            let Some(region) = self.regions.get(name) else {
                tracing::debug!(region = name, "no cache region for keys; nothing to drop");
                continue;
            };
            match region.invalidate_all(keys).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::error!(region = name, error = %e, "cache invalidation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
