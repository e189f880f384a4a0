use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Token-bucket rate limiter shared by all translation callers.
///
/// Refill is computed from monotonic elapsed time since the last check,
/// capped at the bucket capacity. `acquire` waits cooperatively; the lock is
/// never held across an await point.
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// `rate` tokens per second, bursting up to `capacity`. Starts full.
    #[must_use]
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            capacity: capacity.max(1.0),
            state: Mutex::new(BucketState {
                tokens: capacity.max(1.0),
                last: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then debit one.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                let elapsed = now.duration_since(st.last).as_secs_f64();
                st.last = now;
                st.tokens = (st.tokens + elapsed * self.rate).min(self.capacity);
                if st.tokens >= 1.0 {
                    st.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - st.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (test/introspection hook).
    #[must_use]
    pub fn available(&self) -> f64 {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.tokens
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_then_debit() {
        let bucket = TokenBucket::new(10.0, 3.0);
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(bucket.available() < 1.0);
    }

    #[tokio::test]
    async fn refills_over_time() {
        tokio::time::pause();
        let bucket = TokenBucket::new(2.0, 2.0);
        bucket.acquire().await;
        bucket.acquire().await;
        // Empty now; the next acquire must wait for a refill.
        let start = tokio::time::Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn refill_is_capped_at_capacity() {
        tokio::time::pause();
        let bucket = TokenBucket::new(100.0, 2.0);
        tokio::time::advance(Duration::from_secs(60)).await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(bucket.available() < 1.0);
    }
}
