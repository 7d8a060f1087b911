/*
 * Responsibility
 * - Time source shared by the rate limiter, credential verifier and cache
 * - `monotonic()` for elapsed-time math, `unix_seconds()` for token claims
 * - ManualClock lets tests move time without sleeping
 */
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync + 'static {
    fn monotonic(&self) -> Instant;

    /// Wall-clock seconds since the unix epoch (used for `exp` / `nbf`).
    fn unix_seconds(&self) -> u64;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn monotonic(&self) -> Instant {
        Instant::now()
    }

    fn unix_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
///
/// Both readings advance together, so a test can drain a bucket, `advance`, and
/// expire a token with the same call.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    unix_origin: u64,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(unix_origin: u64) -> Self {
        Self {
            origin: Instant::now(),
            unix_origin,
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Instant {
        self.origin + self.offset()
    }

    fn unix_seconds(&self) -> u64 {
        self.unix_origin + self.offset().as_secs()
    }
}
