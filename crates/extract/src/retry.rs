use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Exponential backoff with a fixed attempt ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// An attempt failed with an error the predicate refused to retry.
    Permanent { attempts: u32, error: E },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(10000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            multiplier: 2.0,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0).round() as u64)
    }

    /// Run `f` until it succeeds, the predicate rejects an error, or the
    /// attempts run out.
    pub async fn run<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        is_retryable: P,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !is_retryable(&e) => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                    return Err(RetryError::Permanent { attempts: attempt, error: e });
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max attempts"
                        );
                        return Err(RetryError::Exhausted { attempts: attempt, last_error: e });
                    }

                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}
