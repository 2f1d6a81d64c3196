//! Per-route request-rate limiting.
//!
//! A token bucket per client address per route class bounds load on the
//! generation backend and on write-heavy endpoints. Buckets hold one
//! minute of capacity and refill continuously. The bucket map keeps one
//! small entry per client address seen over the process lifetime and is
//! never pruned; that growth is an accepted gap, bounded in practice by
//! the address space a deployment actually sees.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            capacity: f64::from(limit),
            refill_per_sec: f64::from(limit) / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `key`, refilling by elapsed time first. Returns
    /// false when the bucket is empty.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("bucket map poisoned");
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exhausts_at_capacity() {
        let limiter = RateLimiter::per_minute(2);
        let now = Instant::now();
        assert!(limiter.try_acquire_at("1.2.3.4", now));
        assert!(limiter.try_acquire_at("1.2.3.4", now));
        assert!(!limiter.try_acquire_at("1.2.3.4", now));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::per_minute(1);
        let now = Instant::now();
        assert!(limiter.try_acquire_at("a", now));
        assert!(!limiter.try_acquire_at("a", now));
        assert!(limiter.try_acquire_at("b", now));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::per_minute(60); // 1 token/sec
        let start = Instant::now();
        assert!(limiter.try_acquire_at("k", start));
        for _ in 0..59 {
            limiter.try_acquire_at("k", start);
        }
        assert!(!limiter.try_acquire_at("k", start));
        assert!(limiter.try_acquire_at("k", start + Duration::from_secs(2)));
    }
}
