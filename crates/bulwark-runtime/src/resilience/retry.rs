//! Retry executor for transient store failures.
//!
//! Transient failures are retried with capped exponential backoff. Throttling
//! surfaces immediately as [`BulwarkError::RateLimitExceeded`] so the caller
//! can back off at its own level, and fatal errors pass through untouched.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use bulwark_core::{BulwarkError, FailureClass, RetryPolicy};

/// Backoff schedule for a policy.
pub fn backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    let builder = ExponentialBuilder::default()
        .with_min_delay(policy.base_delay)
        .with_max_delay(policy.max_delay)
        .with_factor(policy.backoff_multiplier as f32)
        .with_max_times(policy.max_retries as usize);

    if policy.jitter {
        builder.with_jitter()
    } else {
        builder
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the policy runs out.
///
/// `op` is invoked at most `max_retries + 1` times. A transient failure that
/// outlives the policy comes back as [`BulwarkError::TransientStore`] carrying
/// the attempt count and the last error.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, BulwarkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BulwarkError>>,
{
    let attempts = AtomicU32::new(0);

    let result = (|| {
        attempts.fetch_add(1, Ordering::Relaxed);
        op()
    })
    .retry(backoff(policy))
    .sleep(tokio::time::sleep)
    .when(|e: &BulwarkError| e.is_retryable())
    .notify(|e: &BulwarkError, delay| {
        tracing::debug!(
            attempt = attempts.load(Ordering::Relaxed),
            delay = ?delay,
            error = %e,
            "Transient store failure, retrying"
        );
    })
    .await;

    result.map_err(|e| match e.failure_class() {
        FailureClass::RateLimited => {
            tracing::warn!(error = %e, "Store is throttling, not retrying");
            e.into_rate_limited()
        }
        FailureClass::Transient => {
            let attempts = attempts.load(Ordering::Relaxed);
            tracing::error!(attempts, error = %e, "Retries exhausted");
            BulwarkError::TransientStore {
                attempts,
                last: Box::new(e),
            }
        }
        FailureClass::Fatal => e,
    })
}
