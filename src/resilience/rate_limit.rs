//! Token bucket gating how often a reconciliation may start.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Longest single throttle wait.
const MAX_WAIT: Duration = Duration::from_secs(86_400);

/// A blocking token bucket.
///
/// The bucket starts full, so the first `burst` callers pass immediately.
/// Afterwards every [`accept`](Self::accept) waits for one token to refill.
/// Callers serialize access through `&mut self`.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl RateLimiter {
    pub fn new(refill_per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_rate: refill_per_second,
            last_update: Instant::now(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.refill_per_second, config.burst)
    }

    /// Wait until a token is available, then consume it.
    pub async fn accept(&mut self) {
        self.refill();

        if self.tokens < 1.0 {
            let wait = wait_for_token(self.tokens, self.refill_rate);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Reconciliation throttled");
            tokio::time::sleep(wait).await;
            self.refill();
            // Guard against float rounding leaving us a hair under one token.
            self.tokens = self.tokens.max(1.0);
        }

        self.tokens -= 1.0;
    }

    /// Tokens currently available, after refilling.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }
}

/// Time until one token is available, capped at [`MAX_WAIT`].
fn wait_for_token(tokens: f64, refill_rate: f64) -> Duration {
    Duration::try_from_secs_f64((1.0 - tokens) / refill_rate)
        .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_not_blocked() {
        let mut limiter = RateLimiter::new(0.1, 1);
        let start = Instant::now();
        limiter.accept().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_are_spaced_by_refill() {
        let mut limiter = RateLimiter::new(0.1, 1);
        let mut starts = Vec::new();
        for _ in 0..4 {
            limiter.accept().await;
            starts.push(Instant::now());
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10) - Duration::from_millis(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_passes_then_throttles() {
        let mut limiter = RateLimiter::new(2.0, 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.accept().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.accept().await;
        assert!(start.elapsed() >= Duration::from_millis(499));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_refills_up_to_capacity() {
        let mut limiter = RateLimiter::new(1.0, 2);
        limiter.accept().await;
        limiter.accept().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.available(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_waits_at_most_a_day() {
        let mut limiter = RateLimiter::new(1e-20, 1);
        limiter.accept().await;

        let start = Instant::now();
        limiter.accept().await;
        assert!(start.elapsed() >= MAX_WAIT);
        assert!(start.elapsed() < MAX_WAIT + Duration::from_secs(1));
    }

    #[test]
    fn test_wait_for_token_is_bounded() {
        assert_eq!(wait_for_token(0.0, 2.0), Duration::from_millis(500));
        assert_eq!(wait_for_token(0.0, 1e-20), MAX_WAIT);
        assert_eq!(wait_for_token(0.0, 0.0), MAX_WAIT);
        assert_eq!(wait_for_token(0.0, f64::NAN), MAX_WAIT);
    }

    #[test]
    fn test_zero_burst_is_raised_to_one() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut limiter = RateLimiter::new(1.0, 0);
            assert_eq!(limiter.available(), 1.0);
        });
    }
}
