//! Bounded retry with exponential backoff for transient upstream errors.
//!
//! Only errors classified transient by [`HubError::is_transient`] are
//! retried: network resets, timeouts, rate limits, stream breaks.
//! Validation and auth errors surface immediately. A `RateLimited` error
//! carrying a retry-after hint stretches the next delay accordingly.

use std::time::Duration;

use modelhub_types::error::HubError;

/// Retry policy for one upstream call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            multiplier: 2.0,
            max_delay_ms: 4_000,
        }
    }
}

/// Run `operation` under the policy, retrying transient failures with
/// exponential backoff. The final attempt's error is returned as-is.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, HubError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, HubError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay_ms = policy.initial_delay_ms;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                if let HubError::RateLimited {
                    retry_after_ms: Some(hint),
                    ..
                } = &err
                {
                    delay_ms = delay_ms.max(*hint);
                }
                delay_ms = delay_ms.min(policy.max_delay_ms);
                tracing::debug!(
                    attempt,
                    delay_ms,
                    error = %err,
                    "Transient upstream error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64) * policy.multiplier) as u64;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 8,
        }
    }

    fn transient() -> HubError {
        HubError::UpstreamCallFailed {
            provider: "test".to_string(),
            message: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = retry_with_backoff(&fast_policy(3), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), HubError> = retry_with_backoff(&fast_policy(3), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            HubError::UpstreamCallFailed { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), HubError> = retry_with_backoff(&fast_policy(3), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(HubError::AuthenticationFailed("test".to_string())) }
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            HubError::AuthenticationFailed(_)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_hint_is_honored_up_to_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        // Hint of 60s must be capped by max_delay_ms, not waited in full.
        let start = std::time::Instant::now();
        let result: Result<(), HubError> = retry_with_backoff(&fast_policy(2), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(HubError::RateLimited {
                    provider: "test".to_string(),
                    retry_after_ms: Some(60_000),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
