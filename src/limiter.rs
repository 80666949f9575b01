//! Token-bucket rate limiting for venue API calls.
//!
//! Each call category gets its own bucket. Quote polling uses
//! [`TokenBucket::try_acquire`] and simply skips a poll when the bucket is
//! empty; order placement uses [`TokenBucket::acquire`] and blocks briefly.
//! A venue 429 halves the refill rate (never below the floor); the rate then
//! recovers additively toward its configured baseline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::config::Config;
use crate::metrics;

/// Fraction of the base rate the refill never drops below.
const MIN_RATE_FRACTION: f64 = 0.125;

/// Tokens per second recovered after a tightening, per second elapsed.
const RECOVERY_PER_SEC: f64 = 0.25;

/// Poll granularity while blocked in [`TokenBucket::acquire`].
const ACQUIRE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

/// A single token bucket with multiplicative tightening and additive recovery.
#[derive(Debug)]
pub struct TokenBucket {
    name: &'static str,
    capacity: f64,
    base_rate: f64,
    min_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket filled to capacity.
    pub fn new(name: &'static str, rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            name,
            capacity,
            base_rate: rate_per_sec,
            min_rate: rate_per_sec * MIN_RATE_FRACTION,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refill_per_sec: rate_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;

        state.tokens = (state.tokens + elapsed * state.refill_per_sec).min(self.capacity);

        // Additive recovery toward the baseline rate.
        if state.refill_per_sec < self.base_rate {
            state.refill_per_sec =
                (state.refill_per_sec + elapsed * RECOVERY_PER_SEC).min(self.base_rate);
        }
    }

    /// Take `cost` tokens if available right now. Never waits.
    pub async fn try_acquire(&self, cost: f64) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Take `cost` tokens, waiting up to `max_wait` for budget.
    ///
    /// Returns false if the budget did not materialize in time.
    pub async fn acquire(&self, cost: f64, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= cost {
                    state.tokens -= cost;
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    /// Whether the bucket could cover `cost` without waiting.
    pub async fn has_budget(&self, cost: f64) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens >= cost
    }

    /// React to a venue 429 by halving the refill rate.
    pub async fn on_venue_rejection(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        let tightened = (state.refill_per_sec / 2.0).max(self.min_rate);
        warn!(
            bucket = self.name,
            from = state.refill_per_sec,
            to = tightened,
            "venue rate limit hit, tightening"
        );
        state.refill_per_sec = tightened;
        metrics::inc_rate_limit_tightened(self.name);
    }

    /// Current refill rate in tokens per second.
    pub async fn current_rate(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.refill_per_sec
    }
}

/// Shared per-category buckets.
#[derive(Debug)]
pub struct RateBudget {
    /// Quote polling and book fetch calls.
    pub quotes: TokenBucket,
    /// Order placement calls.
    pub orders: TokenBucket,
}

impl RateBudget {
    /// Build the budget from the application config.
    pub fn from_config(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            quotes: TokenBucket::new("quotes", config.quote_rate_per_sec, config.quote_burst),
            orders: TokenBucket::new("orders", config.order_rate_per_sec, config.order_burst),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_capped_at_capacity() {
        let bucket = TokenBucket::new("test", 4.0, 4.0);

        let mut granted = 0;
        for _ in 0..10 {
            if bucket.try_acquire(1.0).await {
                granted += 1;
            }
        }
        assert_eq!(granted, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_acquirers_never_exceed_capacity() {
        // No refill, so the grant count depends only on the capacity.
        let bucket = Arc::new(TokenBucket::new("test", 0.0, 8.0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move { bucket.try_acquire(1.0).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                granted += 1;
            }
        }
        assert_eq!(granted, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_refill_over_time() {
        let bucket = TokenBucket::new("test", 2.0, 2.0);
        assert!(bucket.try_acquire(2.0).await);
        assert!(!bucket.try_acquire(1.0).await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_acquire(2.0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_budget() {
        let bucket = TokenBucket::new("test", 10.0, 1.0);
        assert!(bucket.try_acquire(1.0).await);

        // 1 token refills within 100ms at 10/s; well inside the wait budget.
        assert!(bucket.acquire(1.0, Duration::from_millis(500)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_starved() {
        let bucket = TokenBucket::new("test", 0.5, 1.0);
        assert!(bucket.try_acquire(1.0).await);

        // Needs 2s to refill a full token but we only wait 100ms.
        assert!(!bucket.acquire(1.0, Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_halves_rate_with_floor() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);

        bucket.on_venue_rejection().await;
        assert_eq!(bucket.current_rate().await, 4.0);

        // Repeated rejections bottom out at the floor.
        for _ in 0..10 {
            bucket.on_venue_rejection().await;
        }
        assert_eq!(bucket.current_rate().await, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_recovers_additively() {
        let bucket = TokenBucket::new("test", 8.0, 8.0);
        bucket.on_venue_rejection().await;
        assert_eq!(bucket.current_rate().await, 4.0);

        tokio::time::advance(Duration::from_secs(4)).await;
        let recovered = bucket.current_rate().await;
        assert!(recovered > 4.0 && recovered <= 8.0);

        // Eventually back at the baseline, never above it.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.current_rate().await, 8.0);
    }
}
