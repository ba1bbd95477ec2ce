//! Per-model admission control.
//!
//! Each model gets one token bucket, created on first use. Refill is
//! computed lazily from elapsed time at every acquire; there is no
//! background timer. Waiters queue on a FIFO mutex, so admission order
//! follows arrival order.
//!
//! The bucket table is bounded: once `max_buckets` models have buckets the
//! least recently used one is dropped, and [`RateLimiter::evict`] removes a
//! bucket explicitly. A dropped bucket comes back full on next use.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::RateLimit;

/// Slowest accepted refill rate, in tokens per second.
pub const MIN_REFILL_RATE: f64 = 1e-6;

/// Longest single sleep while waiting for tokens. Waits loop, so a longer
/// deficit just sleeps again.
const MAX_REFILL_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionError {
    /// Asking for more than the bucket can ever hold would wait forever.
    #[error("Requested {cost} tokens but bucket capacity is {capacity}")]
    CostExceedsCapacity { cost: u32, capacity: u32 },

    #[error("Invalid refill rate {0}")]
    InvalidRate(f64),
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    rate: f64,
    state: tokio::sync::Mutex<BucketState>,
}

impl TokenBucket {
    /// New bucket, initially full.
    pub fn new(limit: RateLimit) -> Result<Self, AdmissionError> {
        let rate = limit.requests_per_second;
        if !(rate.is_finite() && rate >= MIN_REFILL_RATE) {
            return Err(AdmissionError::InvalidRate(limit.requests_per_second));
        }
        Ok(Self {
            capacity: limit.burst_capacity,
            rate: limit.requests_per_second,
            state: tokio::sync::Mutex::new(BucketState {
                tokens: f64::from(limit.burst_capacity),
                last_refill: Instant::now(),
            }),
        })
    }

    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    fn matches(&self, limit: RateLimit) -> bool {
        self.capacity == limit.burst_capacity
            && (self.rate - limit.requests_per_second).abs() < f64::EPSILON
    }

    /// Wait until `cost` tokens are available, then take them.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self, cost: u32) -> Result<Duration, AdmissionError> {
        if cost > self.capacity {
            return Err(AdmissionError::CostExceedsCapacity {
                cost,
                capacity: self.capacity,
            });
        }

        let started = Instant::now();
        let needed = f64::from(cost);
        let mut state = self.state.lock().await;

        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = elapsed
                .mul_add(self.rate, state.tokens)
                .min(f64::from(self.capacity));
            state.last_refill = now;

            if state.tokens >= needed {
                state.tokens -= needed;
                return Ok(started.elapsed());
            }

            let wait = refill_wait(needed - state.tokens, self.rate);
            trace!(wait_ms = wait.as_millis(), "Token bucket empty, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Current token count after refill. For diagnostics.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = elapsed
            .mul_add(self.rate, state.tokens)
            .min(f64::from(self.capacity));
        state.last_refill = now;
        state.tokens
    }
}

/// Time for `deficit` tokens to accrue at `rate`, clamped to a sane sleep.
fn refill_wait(deficit: f64, rate: f64) -> Duration {
    Duration::try_from_secs_f64(deficit / rate)
        .unwrap_or(MAX_REFILL_WAIT)
        .clamp(Duration::from_nanos(1), MAX_REFILL_WAIT)
}

/// Table of token buckets keyed by model id.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<LruCache<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    /// Limiter holding at most `max_buckets` buckets (minimum 1).
    pub fn new(max_buckets: usize) -> Self {
        let cap = NonZeroUsize::new(max_buckets).unwrap_or(NonZeroUsize::MIN);
        Self {
            buckets: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Bucket for `model_id`, created from `limit` if absent or if the
    /// configured limit changed.
    pub fn bucket(&self, model_id: &str, limit: RateLimit) -> Result<Arc<TokenBucket>, AdmissionError> {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(model_id) {
            if bucket.matches(limit) {
                return Ok(Arc::clone(bucket));
            }
        }
        let bucket = Arc::new(TokenBucket::new(limit)?);
        if let Some((evicted, _)) = buckets.push(model_id.to_string(), Arc::clone(&bucket)) {
            if evicted != model_id {
                debug!(model = %evicted, "Evicted idle rate-limit bucket");
            }
        }
        Ok(bucket)
    }

    /// Take `cost` tokens from `model_id`'s bucket, waiting as needed.
    ///
    /// The table lock is released before waiting.
    pub async fn acquire(
        &self,
        model_id: &str,
        limit: RateLimit,
        cost: u32,
    ) -> Result<Duration, AdmissionError> {
        let bucket = self.bucket(model_id, limit)?;
        let waited = bucket.acquire(cost).await?;
        metrics::histogram!("infergate_rate_limit_wait_seconds", "model" => model_id.to_string())
            .record(waited.as_secs_f64());
        if !waited.is_zero() {
            debug!(model = %model_id, waited_ms = waited.as_millis(), "Admission delayed");
        }
        Ok(waited)
    }

    /// Drop the bucket for `model_id`. Returns whether one existed.
    pub fn evict(&self, model_id: &str) -> bool {
        self.buckets.lock().pop(model_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(rps: f64, burst: u32) -> RateLimit {
        RateLimit {
            requests_per_second: rps,
            burst_capacity: burst,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let bucket = TokenBucket::new(limit(1.0, 3)).unwrap();
        let start = Instant::now();

        for _ in 0..3 {
            assert!(bucket.acquire(1).await.unwrap().is_zero());
        }
        let waited = bucket.acquire(1).await.unwrap();

        assert!(waited >= Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let bucket = TokenBucket::new(limit(100.0, 4)).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(bucket.available().await <= 4.0);
    }

    #[tokio::test]
    async fn test_cost_above_capacity_fails_fast() {
        let bucket = TokenBucket::new(limit(1.0, 2)).unwrap();
        let err = bucket.acquire(3).await.unwrap_err();
        assert_eq!(
            err,
            AdmissionError::CostExceedsCapacity {
                cost: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(TokenBucket::new(limit(0.0, 1)).is_err());
        assert!(TokenBucket::new(limit(f64::NAN, 1)).is_err());
        assert_eq!(
            TokenBucket::new(limit(1e-20, 1)).unwrap_err(),
            AdmissionError::InvalidRate(1e-20)
        );
    }

    #[test]
    fn test_refill_wait_is_clamped() {
        assert_eq!(refill_wait(1.0, 2.0), Duration::from_millis(500));
        assert_eq!(refill_wait(1.0, 1e-20), MAX_REFILL_WAIT);
        assert_eq!(refill_wait(1.0, f64::MIN_POSITIVE), MAX_REFILL_WAIT);
        assert_eq!(refill_wait(1e-12, 1e9), Duration::from_nanos(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slowest_rate_waits_without_panicking() {
        let bucket = TokenBucket::new(limit(MIN_REFILL_RATE, 1)).unwrap();
        bucket.acquire(1).await.unwrap();

        let second = tokio::time::timeout(Duration::from_secs(7200), bucket.acquire(1)).await;

        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(16));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire("m1", limit(2.0, 1), 1).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // One immediate, three more at 0.5s intervals.
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_buckets_are_per_model_and_bounded() {
        let limiter = RateLimiter::new(2);
        limiter.acquire("a", limit(1.0, 1), 1).await.unwrap();
        limiter.acquire("b", limit(1.0, 1), 1).await.unwrap();
        limiter.acquire("c", limit(1.0, 1), 1).await.unwrap();
        assert_eq!(limiter.len(), 2);

        assert!(limiter.evict("c"));
        assert!(!limiter.evict("c"));
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_limit_replaces_bucket() {
        let limiter = RateLimiter::new(4);
        let first = limiter.bucket("a", limit(1.0, 1)).unwrap();
        let same = limiter.bucket("a", limit(1.0, 1)).unwrap();
        assert!(Arc::ptr_eq(&first, &same));

        let resized = limiter.bucket("a", limit(1.0, 5)).unwrap();
        assert_eq!(resized.capacity(), 5);
        assert!(!Arc::ptr_eq(&first, &resized));
    }
}
