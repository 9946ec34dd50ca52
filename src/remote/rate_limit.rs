// Token-bucket rate limiter shared by every outbound call (spec §4.3
// "Rate limit"). `R` tokens are added per second, up to a capacity of 1;
// acquisition blocks until a token is available. Capacity is pinned at 1
// rather than `R` so only the very first call is ever free — spec.md's own
// scenario 6 (`rate_limit=5`, 50 pending batches, elapsed >= 9.8s) only
// holds under a strict-interval limiter; a capacity-`R` burst would let the
// first `R` calls through for free and undershoot that bound.
//
// The teacher's `bluesky/rate_limit.rs` uses a sliding window plus
// exponential backoff with jitter on 429s; this gateway's contract is a
// true token bucket with FIFO-fair waiting instead, so the refill model
// changes, but the "compute under a lock, await outside where possible"
// discipline is the same habit carried over from that file.
//
// Here the wait itself happens while still holding the lock: the bucket is
// one shared, globally-serialized resource, so there's no concurrency to
// preserve by releasing early, and holding the lock across the await is
// exactly what gives waiters FIFO ordering — tokio::sync::Mutex queues
// lock acquisitions in the order they were requested.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A shared, FIFO-fair token bucket. One instance is shared via `Arc` across
/// every concurrent caller in a run.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    rate_per_sec: f64,
    capacity: f64,
}

/// Bucket capacity, in tokens. Pinned at 1 so at most a single call is ever
/// free — see the module comment.
const CAPACITY: f64 = 1.0;

impl RateLimiter {
    /// `rate_per_sec` is `R` from config (`rate_limit`).
    pub fn new(rate_per_sec: u32) -> Self {
        let rate_per_sec = rate_per_sec.max(1) as f64;
        Self {
            bucket: Mutex::new(Bucket {
                tokens: CAPACITY,
                last_refill: Instant::now(),
            }),
            rate_per_sec,
            capacity: CAPACITY,
        }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate_per_sec);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn acquire_does_not_block_on_the_very_first_call() {
        let limiter = RateLimiter::new(10);
        limiter.acquire().await;
    }

    #[tokio::test]
    async fn acquire_blocks_once_capacity_exhausted() {
        let limiter = RateLimiter::new(5);
        limiter.acquire().await; // the one free token
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    /// spec.md scenario 6: `rate_limit=5` and 50 pending batches must take
    /// at least `(50-1)/5 = 9.8s` total — only the first acquisition is
    /// free, the remaining 49 are paced one every 0.2s.
    #[tokio::test]
    async fn fifty_batches_at_rate_five_take_at_least_nine_point_eight_seconds() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..50 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(9_800));
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let limiter = Arc::new(RateLimiter::new(1));
        limiter.acquire().await; // drain the initial token

        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().await.push(i);
            }));
            // stagger spawns slightly so arrival order is deterministic
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }
}
