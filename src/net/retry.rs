//! Retry policy for network-bound probes.
//!
//! Only transport failures are retried: timeouts, connection errors and
//! transient HTTP statuses. Format failures (non-JSON bodies, undecodable
//! JSON) are classified [`FailureType::FormatInvalid`] and never retried.
//!
//! Delays grow linearly: `first_delay + delay_step * (attempt - 1)`, which with
//! the defaults gives 2s after the first failure and 3s after the second.
//!
//! # Example
//!
//! ```
//! use drug_enricher::net::{FailureType, FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::timeout("https://example.com/api");
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => println!("retry #{attempt} in {delay:?}"),
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::FetchError;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_FIRST_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_DELAY_STEP: Duration = Duration::from_secs(1);

/// Classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeout, connection failure, or transient HTTP status.
    Transient,
    /// Failure that will not change on retry (most 4xx, TLS, bad URL).
    Permanent,
    /// The endpoint answered, but not in the expected format.
    FormatInvalid,
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the 1-indexed number of the next attempt.
    Retry { delay: Duration, attempt: u32 },
    /// Stop retrying.
    DoNotRetry { reason: String },
}

/// Retry configuration with linearly increasing delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    first_delay: Duration,
    delay_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            first_delay: DEFAULT_FIRST_DELAY,
            delay_step: DEFAULT_DELAY_STEP,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, first_delay: Duration, delay_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_delay,
            delay_step,
        }
    }

    /// Default delays with a custom attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Maximum attempts, including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::FormatInvalid => {
                return RetryDecision::DoNotRetry {
                    reason: "response format invalid - not retried".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay_after(attempt),
            attempt: attempt + 1,
        }
    }

    /// Delay to wait after `attempt` failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.first_delay + self.delay_step * attempt.saturating_sub(1)
    }
}

/// Classifies a fetch error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Network (TLS) | Permanent |
/// | Network (other) | Transient |
/// | HTTP 408, 429, 5xx | Transient |
/// | HTTP other | Permanent |
/// | Non-JSON / bad JSON | FormatInvalid |
/// | Invalid URL, client build | Permanent |
#[must_use]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::InvalidContentType { .. } | FetchError::InvalidJson { .. } => {
            FailureType::FormatInvalid
        }
        FetchError::InvalidUrl { .. } | FetchError::ClientBuild { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 | 429 => FailureType::Transient,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Runs `operation` under `policy`, sleeping between attempts.
///
/// Returns the final error together with the number of attempts made when the
/// policy gives up.
///
/// # Errors
///
/// Returns `(FetchError, attempts)` from the last failed attempt.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, (FetchError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        debug!(label, attempt, "fetch attempt");

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        label,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(label, %reason, "not retrying fetch");
                    return Err((error, attempt));
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::ZERO)
    }

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_should_retry_transient_until_exhausted() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 2
            }
        );
        assert_eq!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry {
                delay: Duration::from_secs(3),
                attempt: 3
            }
        );
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(
            matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("exhausted"))
        );
    }

    #[test]
    fn test_should_retry_format_invalid_never_retries() {
        let decision = RetryPolicy::default().should_retry(FailureType::FormatInvalid, 1);
        assert!(
            matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("format"))
        );
    }

    #[test]
    fn test_classify_timeout_transient() {
        assert_eq!(
            classify_error(&FetchError::timeout("http://example.com")),
            FailureType::Transient
        );
    }

    #[test]
    fn test_classify_http_statuses() {
        let classify = |status| classify_error(&FetchError::http_status("http://x", status));
        assert_eq!(classify(503), FailureType::Transient);
        assert_eq!(classify(429), FailureType::Transient);
        assert_eq!(classify(404), FailureType::Permanent);
        assert_eq!(classify(400), FailureType::Permanent);
    }

    #[test]
    fn test_classify_format_failures() {
        let err = FetchError::InvalidJson {
            url: "http://x".to_string(),
            reason: "expected array".to_string(),
            body: "{}".to_string(),
        };
        assert_eq!(classify_error(&err), FailureType::FormatInvalid);
    }

    #[tokio::test]
    async fn test_run_with_retry_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::timeout("http://x")) }
        })
        .await;

        let (error, attempts) = result.unwrap_err();
        assert!(matches!(error, FetchError::Timeout { .. }));
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_with_retry_stops_on_format_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::InvalidContentType {
                    url: "http://x".to_string(),
                    content_type: "text/html".to_string(),
                    body: String::new(),
                })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().1, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_with_retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_policy(3), "test", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(FetchError::timeout("http://x"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
