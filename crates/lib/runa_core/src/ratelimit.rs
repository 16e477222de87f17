//! Keyed token-bucket rate limiting.
//!
//! Buckets refill lazily on read: one token per elapsed `interval`, capped at
//! `burst`. [`Limiter::allow`] consumes a token (never going below zero) and
//! restarts the refill baseline, so a key that keeps failing stays locked
//! until it has been quiet for a full interval.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// A single bucket. Cheap to clone via `Arc`; all state sits behind a mutex.
#[derive(Debug)]
pub struct Limiter {
    interval: Duration,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl Limiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if self.interval.is_zero() {
            bucket.tokens = self.burst;
            bucket.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let steps = (elapsed.as_nanos() / self.interval.as_nanos()).min(u128::from(u32::MAX)) as u32;
        if steps == 0 {
            return;
        }
        bucket.tokens = bucket.tokens.saturating_add(steps).min(self.burst);
        bucket.last_refill = if bucket.tokens == self.burst {
            now
        } else {
            bucket.last_refill + self.interval * steps
        };
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u32 {
        self.tokens_at(Instant::now())
    }

    /// Consume one token, clamped at zero, and restart the refill baseline.
    pub fn allow(&self) {
        self.allow_at(Instant::now());
    }

    /// Consume a token if one is available. Returns whether it was.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        bucket.last_refill = now;
        true
    }

    /// Time until the next token becomes available.
    pub fn retry_after(&self) -> Duration {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        if bucket.tokens > 0 {
            return Duration::ZERO;
        }
        (bucket.last_refill + self.interval).saturating_duration_since(now)
    }

    fn tokens_at(&self, now: Instant) -> u32 {
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        bucket.tokens
    }

    fn allow_at(&self, now: Instant) {
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        bucket.tokens = bucket.tokens.saturating_sub(1);
        bucket.last_refill = now;
    }

    fn is_full(&self) -> bool {
        self.tokens() >= self.burst
    }
}

/// Process-wide registry of limiters, keyed by string.
#[derive(Debug, Default)]
pub struct RateLimitManager {
    limiters: DashMap<String, Arc<Limiter>>,
}

impl RateLimitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the limiter for `key`, creating it on first use. Later calls
    /// with the same key return the same instance; their `interval` and
    /// `burst` are ignored.
    pub fn get_limiter(&self, key: &str, interval: Duration, burst: u32) -> Arc<Limiter> {
        if let Some(existing) = self.limiters.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.limiters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Limiter::new(interval, burst)))
                .value(),
        )
    }

    /// Drop limiters that have fully refilled and are not held elsewhere.
    pub fn purge_idle(&self) -> usize {
        let before = self.limiters.len();
        self.limiters
            .retain(|_, l| Arc::strong_count(l) > 1 || !l.is_full());
        before.saturating_sub(self.limiters.len())
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
