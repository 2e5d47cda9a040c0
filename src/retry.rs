//! Retry logic with exponential backoff
//!
//! Bounded retry for transient request failures. The delay before retry
//! `k` (counted from 0) is `base_delay * 2^k`, capped at the policy's
//! `max_delay`, with optional jitter on top. Backoff is applied only
//! between attempts, never after the final one, and the whole loop is
//! cancellation-aware: a cancelled token settles the call as
//! [`Error::Cancelled`] immediately, even mid-backoff.

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, network errors, HTTP error statuses)
/// should return `true`. Caller-initiated cancellation and semantic
/// failures (undecodable bodies, protocol violations) should return
/// `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be
    /// retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // The per-attempt timer expired; the next attempt may succeed
            Error::Timeout(_) => true,
            // Network-level failures are transient by default
            Error::Transport(_) => true,
            // Non-2xx statuses are retried up to the configured bound; the
            // executor does not inspect the method to suppress retries for
            // non-idempotent calls — that is the caller's choice via the
            // per-request retry count
            Error::Http { .. } => true,
            // Caller asked for the operation to stop
            Error::Cancelled => false,
            // The response arrived; asking again won't change its shape
            Error::Decode(_) => false,
            // Realtime-side failures never flow through the retry loop
            Error::Connection(_) | Error::Protocol(_) => false,
        }
    }
}

/// Execute an async operation with bounded exponential-backoff retry
///
/// Performs at most `policy.max_retries + 1` attempts. Attempts are
/// strictly sequential; the token is raced against both the attempt and
/// the backoff sleep so cancellation settles promptly at any suspension
/// point. Returns the successful value or the last error once attempts
/// are exhausted or a non-retryable error occurs.
pub async fn run<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis(),
                    "request failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "request failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Delay inserted before retry `attempt` (counted from 0)
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(31);
    let delay = policy
        .base_delay
        .saturating_mul(factor)
        .min(policy.max_delay);

    if policy.jitter { add_jitter(delay) } else { delay }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so
/// the actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
