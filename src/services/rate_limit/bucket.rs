//! Token-bucket admission control keyed by client.
//!
//! One `TokenBucketStore` is one rate domain (e.g. "global", "auth"). Buckets are
//! created lazily at full capacity and reclaimed after they have been idle long
//! enough that they would have refilled anyway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::clock::SharedClock;

// Waits too long for `Duration` saturate instead of panicking.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitError {
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Per-domain bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub capacity: u32,
    pub refill_per_second: f64,
    // Buckets untouched for longer than this are eligible for reclamation.
    pub idle_timeout: Duration,
}

impl BucketConfig {
    pub fn new(capacity: u32, refill_per_second: f64) -> Result<Self, RateLimitError> {
        if capacity < 1 {
            return Err(RateLimitError::InvalidConfig("capacity must be >= 1"));
        }
        if !refill_per_second.is_finite() || refill_per_second <= 0.0 {
            return Err(RateLimitError::InvalidConfig(
                "refill_per_second must be a finite number > 0",
            ));
        }
        if Duration::try_from_secs_f64(f64::from(capacity) / refill_per_second).is_err() {
            return Err(RateLimitError::InvalidConfig(
                "refill_per_second too small for capacity",
            ));
        }

        Ok(Self {
            capacity,
            refill_per_second,
            idle_timeout: Duration::from_secs(600),
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Time for an empty bucket to become full again.
    pub fn full_refill(&self) -> Duration {
        secs_to_duration(f64::from(self.capacity) / self.refill_per_second)
    }

    // Reclaiming earlier than a full refill would hand the client free tokens.
    fn reclaim_after(&self) -> Duration {
        self.idle_timeout.max(self.full_refill())
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted { remaining: f64 },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone)]
struct RateLimitState {
    tokens: f64,
    last_refill_at: Instant,
}

pub struct TokenBucketStore {
    name: &'static str,
    config: BucketConfig,
    clock: SharedClock,
    buckets: DashMap<String, RateLimitState>,
}

impl std::fmt::Debug for TokenBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketStore")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("tracked", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl TokenBucketStore {
    pub fn new(name: &'static str, config: BucketConfig, clock: SharedClock) -> Self {
        Self {
            name,
            config,
            clock,
            buckets: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> BucketConfig {
        self.config
    }

    /// Number of client buckets currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    pub fn try_acquire(&self, client_key: &str, cost: u32) -> bool {
        self.acquire(client_key, cost).is_admitted()
    }

    /// Refill then deduct `cost` tokens for `client_key`.
    ///
    /// The whole read-modify-write happens under the map shard's write guard, so two
    /// requests from the same client can never spend the same token. Different keys
    /// only contend when they hash to the same shard.
    pub fn acquire(&self, client_key: &str, cost: u32) -> Admission {
        let now = self.clock.monotonic();

        if let Some(mut state) = self.buckets.get_mut(client_key) {
            return self.apply(&mut state, now, cost);
        }

        let mut state = self
            .buckets
            .entry(client_key.to_owned())
            .or_insert_with(|| RateLimitState {
                tokens: f64::from(self.config.capacity),
                last_refill_at: now,
            });
        self.apply(&mut state, now, cost)
    }

    fn apply(&self, state: &mut RateLimitState, now: Instant, cost: u32) -> Admission {
        let capacity = f64::from(self.config.capacity);
        let elapsed = now.saturating_duration_since(state.last_refill_at);

        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.config.refill_per_second)
            .min(capacity);
        state.last_refill_at = now;

        let cost = f64::from(cost);
        if state.tokens >= cost {
            state.tokens -= cost;
            Admission::Admitted {
                remaining: state.tokens,
            }
        } else {
            let missing = cost - state.tokens;
            Admission::Rejected {
                retry_after: secs_to_duration(missing / self.config.refill_per_second),
            }
        }
    }

    /// Drop buckets that have been idle past the reclaim threshold.
    ///
    /// `retain` takes each shard's write lock, so a bucket that is mid-update is
    /// never observed or removed half-way.
    pub fn reclaim_idle(&self) -> usize {
        let now = self.clock.monotonic();
        let threshold = self.config.reclaim_after();
        let mut reclaimed = 0;

        self.buckets.retain(|_, state| {
            let keep = now.saturating_duration_since(state.last_refill_at) < threshold;
            if !keep {
                reclaimed += 1;
            }
            keep
        });

        reclaimed
    }

    /// Periodically reclaim idle buckets off the request path.
    pub fn spawn_reaper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let reclaimed = self.reclaim_idle();
                if reclaimed > 0 {
                    tracing::debug!(
                        domain = self.name,
                        reclaimed,
                        tracked = self.tracked_clients(),
                        "reclaimed idle rate limit buckets"
                    );
                }
            }
        })
    }
}
