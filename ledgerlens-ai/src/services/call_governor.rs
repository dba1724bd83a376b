//! Call Governor
//!
//! Every outbound reasoning-service call goes through [`CallGovernor::execute`]:
//! - One process-wide token bucket (`governor` GCRA limiter), one token per
//!   attempt. Callers wait cooperatively until a token is available.
//! - Failures are classified into an [`ErrorCategory`]; only rate-limited,
//!   server-error, timeout and network failures are retried.
//! - Exponential backoff from an initial delay, capped at a maximum, doubled
//!   again for rate-limited failures.
//! - Token waits and backoff waits both abort immediately on cancellation
//!   with a `canceled` error.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use ledgerlens_common::config::{RateLimitConfig, RetryConfig};
use ledgerlens_common::events::{EventBus, PipelineEvent};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Classified failure of an external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadInput,
    Auth,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    RateLimited,
    ServerError,
    Timeout,
    Canceled,
    Network,
    Unknown,
}

impl ErrorCategory {
    /// Only transient categories are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::ServerError
                | ErrorCategory::Timeout
                | ErrorCategory::Network
        )
    }

    /// Map an HTTP status code onto a category
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCategory::BadInput,
            401 => ErrorCategory::Auth,
            403 => ErrorCategory::Forbidden,
            404 => ErrorCategory::NotFound,
            408 | 504 => ErrorCategory::Timeout,
            413 => ErrorCategory::PayloadTooLarge,
            429 => ErrorCategory::RateLimited,
            500..=599 => ErrorCategory::ServerError,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::BadInput => "bad_input",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::PayloadTooLarge => "payload_too_large",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Canceled => "canceled",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an external call
#[derive(Debug, Clone, Error)]
#[error("{category}: {message}")]
pub struct CallError {
    pub category: ErrorCategory,
    pub message: String,
}

impl CallError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCategory::Canceled, "Call canceled before completion")
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        let category = if err.is_timeout() {
            ErrorCategory::Timeout
        } else if let Some(status) = err.status() {
            ErrorCategory::from_status(status.as_u16())
        } else if err.is_connect() || err.is_request() {
            ErrorCategory::Network
        } else if err.is_decode() || err.is_body() {
            ErrorCategory::ServerError
        } else {
            ErrorCategory::Unknown
        };
        Self::new(category, err.to_string())
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    ///
    /// `min(initial * 2^(attempt-1), max)`, then doubled for rate-limited
    /// failures.
    pub fn delay_for(&self, attempt: u32, category: ErrorCategory) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if category == ErrorCategory::RateLimited {
            base.saturating_mul(2)
        } else {
            base
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide rate limiter plus retry executor
///
/// Clone shares the same bucket.
#[derive(Clone)]
pub struct CallGovernor {
    limiter: Arc<DirectLimiter>,
    capacity: u32,
    event_bus: Option<EventBus>,
}

impl CallGovernor {
    /// Create governor from rate-limit configuration
    ///
    /// Bucket of `capacity` tokens, one token replenished every
    /// `refill_interval / refill_tokens`.
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.effective_capacity();
        let refill_tokens = config.effective_refill_tokens();
        let period = config.refill_interval() / refill_tokens;
        let period = period.max(Duration::from_nanos(1));

        let burst = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        tracing::info!(
            capacity,
            refill_tokens,
            refill_interval_ms = config.refill_interval().as_millis() as u64,
            "Call governor initialized"
        );

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            capacity,
            event_bus: None,
        }
    }

    /// Emit `CallRetried` events on the given bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take a token without waiting; false when the bucket is empty
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait for a token, or fail with `canceled`
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), CallError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::canceled()),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    /// Run `call` under the rate limit with categorized retry
    ///
    /// # Arguments
    /// * `operation` - Name for logging (e.g. "extract_text", "analyze")
    /// * `policy` - Retry policy
    /// * `cancel` - Aborts token and backoff waits
    /// * `call` - Produces one attempt's future
    ///
    /// # Returns
    /// First successful result, or the final error. A non-retryable error is
    /// returned immediately; cancellation returns a `canceled` error rather
    /// than the failure that preceded it.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            self.acquire(cancel).await?;

            if attempt > 1 {
                tracing::debug!(operation, attempt, "Retrying external call");
            }

            let err = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "External call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(
                    operation,
                    attempt,
                    category = err.category.as_str(),
                    error = %err.message,
                    "External call failed permanently"
                );
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    operation,
                    attempt,
                    category = err.category.as_str(),
                    error = %err.message,
                    "External call failed: retry attempts exhausted"
                );
                return Err(err);
            }

            let delay = policy.delay_for(attempt, err.category);
            tracing::warn!(
                operation,
                attempt,
                category = err.category.as_str(),
                delay_ms = delay.as_millis() as u64,
                error = %err.message,
                "External call failed, will retry after backoff"
            );

            if let Some(bus) = &self.event_bus {
                bus.emit_lossy(PipelineEvent::CallRetried {
                    operation: operation.to_string(),
                    attempt,
                    category: err.category.as_str().to_string(),
                    delay_ms: delay.as_millis() as u64,
                    timestamp: chrono::Utc::now(),
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(operation, attempt, "Backoff aborted by cancellation");
                    return Err(CallError::canceled());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn roomy_governor() -> CallGovernor {
        CallGovernor::new(&RateLimitConfig {
            capacity: Some(100),
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn test_retryable_categories() {
        let retryable: Vec<ErrorCategory> = [
            ErrorCategory::BadInput,
            ErrorCategory::Auth,
            ErrorCategory::Forbidden,
            ErrorCategory::NotFound,
            ErrorCategory::PayloadTooLarge,
            ErrorCategory::RateLimited,
            ErrorCategory::ServerError,
            ErrorCategory::Timeout,
            ErrorCategory::Canceled,
            ErrorCategory::Network,
            ErrorCategory::Unknown,
        ]
        .into_iter()
        .filter(|c| c.is_retryable())
        .collect();

        assert_eq!(
            retryable,
            vec![
                ErrorCategory::RateLimited,
                ErrorCategory::ServerError,
                ErrorCategory::Timeout,
                ErrorCategory::Network
            ]
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCategory::from_status(400), ErrorCategory::BadInput);
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_status(403), ErrorCategory::Forbidden);
        assert_eq!(ErrorCategory::from_status(413), ErrorCategory::PayloadTooLarge);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimited);
        assert_eq!(ErrorCategory::from_status(502), ErrorCategory::ServerError);
        assert_eq!(ErrorCategory::from_status(504), ErrorCategory::Timeout);
        assert_eq!(ErrorCategory::from_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, ErrorCategory::ServerError), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, ErrorCategory::ServerError), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3, ErrorCategory::ServerError), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10, ErrorCategory::ServerError), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limited_delay_doubles_after_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, ErrorCategory::RateLimited), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10, ErrorCategory::RateLimited), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_transient_error_retried_until_success() {
        let governor = roomy_governor();
        let calls = AtomicU32::new(0);

        let result = governor
            .execute("test", &fast_policy(3), &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(CallError::new(ErrorCategory::ServerError, "boom"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let governor = roomy_governor();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = governor
            .execute("test", &fast_policy(3), &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::new(ErrorCategory::Auth, "bad key")) }
            })
            .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let governor = roomy_governor();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = governor
            .execute("test", &fast_policy(3), &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::new(ErrorCategory::Network, "reset")) }
            })
            .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Cancellation during backoff wins over the original failure
    #[tokio::test]
    async fn test_cancel_during_backoff_returns_canceled() {
        let governor = roomy_governor();
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        };

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), _> = governor
            .execute("test", &policy, &cancel, || async {
                Err(CallError::new(ErrorCategory::ServerError, "boom"))
            })
            .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::Canceled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_every_attempt_consumes_a_token() {
        let governor = CallGovernor::new(&RateLimitConfig {
            capacity: Some(2),
            refill_tokens: Some(1),
            refill_interval_ms: 3_600_000,
            ..RateLimitConfig::default()
        });

        let result: Result<(), _> = governor
            .execute("test", &fast_policy(2), &CancellationToken::new(), || async {
                Err(CallError::new(ErrorCategory::Timeout, "slow"))
            })
            .await;

        assert!(result.is_err());
        assert!(!governor.try_acquire(), "both tokens should be spent");
    }
}
