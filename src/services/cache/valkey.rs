use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::ConnectionManager};

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};
use crate::services::cache::region::RegionConfig;

fn command_error(e: RedisError) -> CacheError {
    CacheError::BackendCommand(e.to_string())
}

fn connect_error(e: RedisError) -> CacheError {
    CacheError::BackendConnection(e.to_string())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// PSETEX rejects 0
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

// Members past the bound, oldest first.
fn overflow(indexed: usize, max_entries: usize) -> usize {
    indexed.saturating_sub(max_entries)
}

// ZPOPMIN replies member, score, member, score, ...
fn popped_members(reply: Vec<String>) -> Vec<String> {
    reply.into_iter().step_by(2).collect()
}

/// Open the shared connection and check the server answers.
///
/// A backend configured but unreachable at startup is a startup error; later
/// outages only degrade reads to misses.
pub async fn connect(url: &str) -> Result<ConnectionManager, CacheError> {
    let client = redis::Client::open(url).map_err(connect_error)?;
    let mut conn = ConnectionManager::new(client).await.map_err(connect_error)?;

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(connect_error)?;
    tracing::info!("valkey cache backend connected");

    Ok(conn)
}

/// Valkey/Redis-backed client for one cache region.
///
/// Expiry is enforced server-side, so entries never outlive their TTL even if this
/// process restarts. The region's keys are also tracked in a sorted set scored by
/// write time; once it holds more than `max_entries`, the oldest entries are
/// deleted. Index members whose TTL has passed are pruned on every write, so they
/// never count against the bound.
#[derive(Clone)]
pub struct ValkeyClient {
    conn: ConnectionManager,
    index_key: String,
    config: RegionConfig,
}

impl std::fmt::Debug for ValkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyClient")
            .field("index_key", &self.index_key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ValkeyClient {
    pub fn for_region(conn: ConnectionManager, region: &str, config: RegionConfig) -> Self {
        Self {
            conn,
            index_key: format!("cache-index:{region}"),
            config,
        }
    }

    async fn evict_overflow(&self, indexed: usize) -> CacheResult<()> {
        let excess = overflow(indexed, self.config.max_entries);
        if excess == 0 {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let count = isize::try_from(excess).unwrap_or(isize::MAX);
        let reply: Vec<String> = conn
            .zpopmin(&self.index_key, count)
            .await
            .map_err(command_error)?;
        let victims = popped_members(reply);
        if victims.is_empty() {
            return Ok(());
        }

        let _: u64 = conn.del(&victims).await.map_err(command_error)?;
        tracing::debug!(index = %self.index_key, evicted = victims.len(), "evicted oldest cache entries");
        Ok(())
    }
}

#[async_trait]
impl CacheClient for ValkeyClient {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(command_error)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl);
        let index_millis = ttl_millis(self.config.ttl.max(ttl));
        let now = now_millis();
        let cutoff = now.saturating_sub(index_millis);

        let (indexed,): (usize,) = redis::pipe()
            .atomic()
            .pset_ex(key, value, millis)
            .ignore()
            .zadd(&self.index_key, key, now)
            .ignore()
            .zrembyscore(&self.index_key, "-inf", cutoff)
            .ignore()
            .pexpire(&self.index_key, i64::try_from(index_millis).unwrap_or(i64::MAX))
            .ignore()
            .zcard(&self.index_key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        self.evict_overflow(indexed).await
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();

        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .del(keys)
            .zrem(&self.index_key, keys)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_entries_past_the_bound_are_evicted() {
        assert_eq!(overflow(3, 5), 0);
        assert_eq!(overflow(5, 5), 0);
        assert_eq!(overflow(7, 5), 2);
    }

    #[test]
    fn popped_reply_keeps_members_only() {
        let reply = vec![
            "cache:task:1".to_string(),
            "1700000000000".to_string(),
            "cache:task:2".to_string(),
            "1700000000001".to_string(),
        ];
        assert_eq!(popped_members(reply), vec!["cache:task:1", "cache:task:2"]);
    }

    #[test]
    fn zero_ttl_is_clamped_for_psetex() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }

    // Needs a live server: VALKEY_URL=redis://127.0.0.1:6379 cargo test
    #[tokio::test]
    async fn region_never_holds_more_than_max_entries() {
        let Ok(url) = std::env::var("VALKEY_URL") else {
            return;
        };
        let conn = connect(&url).await.unwrap();
        let region = format!("bound-test-{}", now_millis());
        let config = RegionConfig::new(2, Duration::from_secs(60)).unwrap();
        let client = ValkeyClient::for_region(conn, &region, config);

        let keys: Vec<String> = (0..4).map(|i| format!("cache:{region}:{i}")).collect();
        for key in &keys {
            client
                .set_with_ttl(key, "v", Duration::from_secs(60))
                .await
                .unwrap();
            // distinct write-time scores
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(client.get_string(&keys[0]).await.unwrap(), None);
        assert_eq!(client.get_string(&keys[1]).await.unwrap(), None);
        assert_eq!(client.get_string(&keys[3]).await.unwrap().as_deref(), Some("v"));

        client.del(&keys).await.unwrap();
    }
}
