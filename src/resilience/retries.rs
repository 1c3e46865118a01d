//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible async operation until it succeeds
//! - Sleep between attempts according to an [`ExponentialBackoff`]
//! - Give up once the backoff's elapsed budget is spent, surfacing the last error

use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::ExponentialBackoff;

/// Returned when every attempt within the budget failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_error: E,
}

/// Run `op` until it returns `Ok`, or the backoff gives up.
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(mut backoff: ExponentialBackoff, mut op: F) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    backoff.reset();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => match backoff.next_backoff() {
                Some(delay) => {
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(Exhausted {
                        attempts: attempt,
                        elapsed: backoff.elapsed(),
                        last_error: e,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpRetryConfig;

    fn backoff(max_elapsed_ms: u64) -> ExponentialBackoff {
        ExponentialBackoff::new(&HttpRetryConfig {
            initial_interval_ms: 100,
            multiplier: 1.5,
            randomization_factor: 0.0,
            max_interval_ms: 1_000,
            max_elapsed_ms,
            request_timeout_ms: 1_000,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let result: Result<u32, Exhausted<&str>> = retry(backoff(10_000), |attempt| async move {
            if attempt < 3 {
                Err("not yet")
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_with_last_error() {
        let result: Result<(), Exhausted<String>> =
            retry(backoff(2_000), |attempt| async move { Err(format!("attempt {}", attempt)) }).await;

        let exhausted = result.unwrap_err();
        assert!(exhausted.attempts > 1);
        assert_eq!(exhausted.last_error, format!("attempt {}", exhausted.attempts));
        assert!(exhausted.elapsed <= Duration::from_secs(2));
    }
}
