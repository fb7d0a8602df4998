//! Backoff Policy
//!
//! Deterministic exponential backoff shared by every recovery path:
//! the reconnect supervisor, the polling fallback, and one-shot
//! mutation retries. Delays double from a base with no jitter, so the
//! schedule is exactly predictable under test.

use std::future::Future;
use std::time::Duration;

use crate::domain::classify::{StoreError, classify};

// =============================================================================
// Defaults
// =============================================================================

/// Base delay seeding the exponential schedule.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Reconnect attempts before the monitor gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Retries (beyond the first attempt) for one-shot mutations.
pub const DEFAULT_MUTATION_RETRIES: u32 = 3;

// =============================================================================
// Delay Schedule
// =============================================================================

/// Delay before retry number `attempt` (0-based): `base × 2^attempt`.
///
/// Saturates instead of overflowing, so absurd attempt counts yield a
/// very long delay rather than a panic.
#[must_use]
pub const fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Reconnection policy: how long to wait between attempts, and how
/// many to make before giving up.
///
/// The policy itself is stateless; the caller owns the attempt
/// counter. That keeps resets (successful connect, fresh network) a
/// plain counter store rather than a policy method.
///
/// # Example
///
/// ```rust
/// use record_sync::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay(0), Duration::from_millis(1000));
/// assert_eq!(policy.delay(4), Duration::from_millis(16000));
/// assert!(policy.attempts_exhausted(5));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; later retries double it.
    pub base_delay: Duration,
    /// Attempt budget before the monitor parks in a failed state.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy with custom values.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Creates a policy from `MonitorSettings`.
    #[must_use]
    pub const fn from_monitor_settings(settings: &crate::MonitorSettings) -> Self {
        Self {
            base_delay: settings.base_delay,
            max_attempts: settings.max_attempts,
        }
    }

    /// Delay to schedule before retry number `attempt` (0-based).
    #[must_use]
    pub const fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, attempt)
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub const fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

// =============================================================================
// One-Shot Retry
// =============================================================================

/// Runs a fallible store operation with exponential backoff.
///
/// Makes up to `max_retries + 1` attempts. Each failure is classified;
/// a non-retryable failure (permission refusal) returns immediately,
/// and the final failure is returned unchanged so callers see the
/// store's own error. Before retry `n` (0-based failure count) the
/// task sleeps for [`backoff_delay`]`(base_delay, n)`.
///
/// Intended for one-shot mutations; live queries recover through the
/// monitor and the polling fallback instead.
///
/// # Errors
///
/// Returns the last [`StoreError`] once retries are exhausted, or the
/// first non-retryable one.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let classification = classify(&error);
                if !classification.is_retryable() {
                    tracing::warn!(
                        class = classification.as_str(),
                        error = %error,
                        "Operation failed with non-retryable error"
                    );
                    return Err(error);
                }
                if attempt >= max_retries {
                    tracing::warn!(
                        attempts = attempt + 1,
                        class = classification.as_str(),
                        error = %error,
                        "Operation failed after exhausting retries"
                    );
                    return Err(error);
                }

                let delay = backoff_delay(base_delay, attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    class = classification.as_str(),
                    "Retrying operation after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::domain::classify::StoreErrorCode;

    #[test]
    fn default_policy_values() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let policy = ReconnectPolicy::default();

        let delays: Vec<u64> = (0..5)
            .map(|attempt| u64::try_from(policy.delay(attempt).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);

        assert!(!policy.attempts_exhausted(4));
        assert!(policy.attempts_exhausted(5));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let delay = backoff_delay(Duration::from_millis(1000), u32::MAX);
        assert!(delay >= backoff_delay(Duration::from_millis(1000), 62));
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_in_attempt(base_ms in 1u64..=60_000, attempt in 0u32..64) {
            let base = Duration::from_millis(base_ms);
            prop_assert!(backoff_delay(base, attempt) <= backoff_delay(base, attempt + 1));
        }

        #[test]
        fn delay_never_panics(base_ms in 0u64..=u64::MAX / 2, attempt in 0u32..=u32::MAX) {
            let _ = backoff_delay(Duration::from_millis(base_ms), attempt);
        }
    }

    fn failing_then_ok(
        failures: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, StoreError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < failures {
                std::future::ready(Err(StoreError::new("backend unreachable")))
            } else {
                std::future::ready(Ok(call))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_without_sleeping() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result =
            retry_with_backoff(failing_then_ok(0, Arc::clone(&calls)), 3, DEFAULT_BASE_DELAY)
                .await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds_with_doubling_delays() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result =
            retry_with_backoff(failing_then_ok(2, Arc::clone(&calls)), 3, DEFAULT_BASE_DELAY)
                .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1000ms after the first failure, 2000ms after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff(
            failing_then_ok(u32::MAX, Arc::clone(&calls)),
            3,
            DEFAULT_BASE_DELAY,
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.message, "backend unreachable");
        // Initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(1000 + 2000 + 4000));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let counting = {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), _>(StoreError::with_code(
                    StoreErrorCode::PermissionDenied,
                    "read refused",
                )))
            }
        };

        let result = retry_with_backoff(counting, 3, DEFAULT_BASE_DELAY).await;

        let error = result.unwrap_err();
        assert_eq!(error.code, Some(StoreErrorCode::PermissionDenied));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
