//! Retry-with-backoff for transient session failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use super::ExecutionError;
use crate::session::SessionError;

/// Backoff applied between attempts of a transient operation.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped
/// at `max_delay`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without waiting.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` up to `attempts` times (at least once), retrying only
/// failures classified as transient.
pub(super) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    attempts: u32,
    resource: &str,
    mut operation: F,
) -> Result<T, ExecutionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let total = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < total => {
                let delay = policy.delay_for(attempt);
                warn!(
                    resource,
                    attempt,
                    total,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(ExecutionError::RetriesExhausted {
                    attempts: total,
                    source: err,
                });
            }
            Err(err) => return Err(ExecutionError::Session(err)),
        }
    }
}

/// Applies `limit` to `operation`, reporting expiry as a transient timeout.
pub(super) async fn bounded<T>(
    limit: Duration,
    label: &str,
    operation: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    timeout(limit, operation)
        .await
        .unwrap_or_else(|_| {
            Err(SessionError::Timeout {
                operation: label.to_owned(),
                seconds: limit.as_secs(),
            })
        })
}
