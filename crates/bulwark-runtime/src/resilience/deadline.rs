//! Wall-clock budget for a single store attempt.

use std::future::Future;
use std::time::Duration;

use bulwark_core::BulwarkError;

/// Race `fut` against `timeout`.
///
/// On expiry the future is dropped and the caller gets
/// [`BulwarkError::DeadlineExceeded`], which classifies as transient.
/// The store may still complete the abandoned statement; writes guarded by a
/// deadline are not known to have failed.
pub async fn with_deadline<F, T>(timeout: Duration, fut: F) -> Result<T, BulwarkError>
where
    F: Future<Output = Result<T, BulwarkError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "Store call exceeded its deadline");
            Err(BulwarkError::DeadlineExceeded { timeout })
        }
    }
}
