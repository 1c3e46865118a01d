//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::HttpRetryConfig;

/// Calculate exponential backoff delay with jitter.
///
/// Used for the source poll loop, where attempts are counted rather than timed.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Elapsed-time bounded exponential backoff.
///
/// Each interval is `current * (1 ± randomization_factor)`; `current` grows by
/// `multiplier` up to `max_interval`. Once the next sleep would push the total
/// past `max_elapsed`, [`next_backoff`](Self::next_backoff) returns `None`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    current_interval: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(config: &HttpRetryConfig) -> Self {
        Self {
            initial_interval: config.initial_interval(),
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
            max_interval: config.max_interval(),
            max_elapsed: config.max_elapsed(),
            current_interval: config.initial_interval(),
            started: Instant::now(),
        }
    }

    /// Restart the clock and the interval sequence.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.started = Instant::now();
    }

    /// Time since construction or the last [`reset`](Self::reset).
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// The next delay to sleep, or `None` when the elapsed budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let next = randomize(self.current_interval, self.randomization_factor);
        self.grow();

        if self.elapsed() + next > self.max_elapsed {
            return None;
        }
        Some(next)
    }

    fn grow(&mut self) {
        let grown = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        };
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = factor * secs;
    let low = secs - delta;
    let high = secs + delta;
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
}
