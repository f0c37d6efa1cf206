//! Hand-rolled per-subject token bucket (§5 Shared-resource policy, §6.1
//! 429 response). Not a crate dependency: the semantics are a fixed
//! capacity refilled at a fixed rate, a few dozen lines, matching the
//! reference workspace's preference for in-process state over an
//! external dependency for small bounded concerns.

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

pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after_secs: u64,
}

impl RateLimiter {
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, subject_id: &str) -> Decision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets.entry(subject_id.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        let reset_after_secs = if self.refill_per_sec > 0.0 {
            ((self.capacity - bucket.tokens) / self.refill_per_sec).ceil().max(0.0) as u64
        } else {
            0
        };

        Decision {
            allowed,
            limit: self.capacity as u64,
            remaining: bucket.tokens.floor().max(0.0) as u64,
            reset_after_secs,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(60, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_capacity_denies_further_requests() {
        let limiter = RateLimiter::new(2, 1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn separate_subjects_have_independent_buckets() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }
}
