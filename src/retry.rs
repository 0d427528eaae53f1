//! Retry with exponential backoff.
//!
//! Every failure is classified before deciding what to do with it: authorization
//! failures and permanent failures return at once, transient failures are retried
//! until the attempt budget runs out.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

/// How a failed request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected credential. Never retried.
    Authorization,
    /// Timeouts, connection resets, error statuses.
    Transient,
    /// Bad data or a broken local resource.
    Permanent,
}

pub trait Classify {
    fn kind(&self) -> FailureKind;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Result of [`RetryPolicy::run`] together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl<T, E> Attempted<T, E> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Attempted<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(attempts, "request succeeded after retry");
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::Authorization => {
                    tracing::warn!(error = %err, "authorization rejected, not retrying");
                }
                FailureKind::Permanent => {
                    tracing::warn!(error = %err, "request failed with non-retryable error");
                }
                FailureKind::Transient if attempts < max_attempts => {
                    let delay = self.delay_for(attempts - 1);
                    tracing::warn!(
                        error = %err,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                FailureKind::Transient => {
                    tracing::warn!(error = %err, attempts, "giving up after all attempts");
                }
            }

            return Attempted {
                result: Err(err),
                attempts,
            };
        }
    }
}
