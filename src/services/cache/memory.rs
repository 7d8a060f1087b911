use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::clock::SharedClock;
use crate::services::cache::client::{CacheClient, CacheResult};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// In-process bounded cache (one per region).
///
/// When full, expired entries are dropped first, then the oldest entry. Eviction
/// scans the map, which is fine for region sizes in the hundreds or low thousands.
pub struct MemoryClient {
    clock: SharedClock,
    max_entries: usize,
    entries: DashMap<String, MemoryEntry>,
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("max_entries", &self.max_entries)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl MemoryClient {
    pub fn new(max_entries: usize, clock: SharedClock) -> Self {
        Self {
            clock,
            max_entries: max_entries.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self, now: Instant) {
        self.entries.retain(|_, e| !e.is_expired(now));

        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().stored_at)
                .map(|e| e.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheClient for MemoryClient {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.clock.monotonic();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        // expired: drop it unless someone re-stored it meanwhile
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let now = self.clock.monotonic();

        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                stored_at: now,
                ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        let removed = keys
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }
}
