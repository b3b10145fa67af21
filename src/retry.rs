//! Linear backoff retry loop shared by feed fetching and LLM calls.
//!
//! Both callers follow the same policy: try once, and on failure wait
//! `step * n` before retry `n`, up to `max_retries` retries. The loop checks
//! the run's [`CancellationToken`] before every attempt and races it against
//! each backoff sleep, so an aborted run stops at the next retry boundary.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy with a delay that grows linearly with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit; retry `n` waits `step * n`.
    pub step: Duration,
}

/// Why a retried operation ultimately gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl LinearBackoff {
    pub fn new(max_retries: u32, step: Duration) -> Self {
        Self { max_retries, step }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }

    /// Total attempts this policy allows.
    #[cfg(test)]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds, the retry budget is spent, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. `label` only feeds the logs.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) if attempt > self.max_retries => {
                    warn!(
                        label,
                        attempt,
                        elapsed_ms_total = started.elapsed().as_millis() as u64,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_retries = self.max_retries,
                        ?delay,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(RetryError::Cancelled { attempts: attempt });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
