//! Integration tests for the process-wide call governor
//!
//! The token bucket runs on the wall clock, so these tests use real time
//! with short refill intervals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ledgerlens_ai::services::{CallError, CallGovernor, ErrorCategory, RetryPolicy};
use ledgerlens_common::config::RateLimitConfig;

fn governor(capacity: u32, refill_tokens: u32, refill_interval_ms: u64) -> CallGovernor {
    CallGovernor::new(&RateLimitConfig {
        capacity: Some(capacity),
        refill_tokens: Some(refill_tokens),
        refill_interval_ms,
        ..RateLimitConfig::default()
    })
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

// ============================================================================
// Token bucket
// ============================================================================

#[test]
fn test_capacity_derived_from_nominal_limit() {
    let governor = CallGovernor::new(&RateLimitConfig {
        nominal_limit: 60,
        headroom: 0.8,
        ..RateLimitConfig::default()
    });
    assert_eq!(governor.capacity(), 48);
}

#[tokio::test]
async fn test_burst_limited_to_capacity() {
    // One token per minute: nothing refills during the test
    let governor = governor(5, 1, 60_000);

    for i in 0..5 {
        assert!(governor.try_acquire(), "token {} should be available", i);
    }
    assert!(!governor.try_acquire());
}

#[tokio::test]
async fn test_clones_share_one_bucket() {
    let governor = governor(5, 1, 60_000);

    let mut join_set = JoinSet::new();
    for _ in 0..20 {
        let governor = governor.clone();
        join_set.spawn(async move { governor.try_acquire() });
    }

    let mut granted = 0;
    while let Some(result) = join_set.join_next().await {
        if result.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 5);
}

#[tokio::test]
async fn test_calls_are_paced_after_burst() {
    // Burst of 3, then one token every 100ms
    let governor = governor(3, 3, 300);
    let cancel = CancellationToken::new();
    let started = Instant::now();

    for _ in 0..6 {
        governor
            .execute("analyze", &fast_policy(), &cancel, || async {
                Ok::<_, CallError>(())
            })
            .await
            .unwrap();
    }

    // The three calls beyond the burst each waited for a refill
    assert!(
        started.elapsed() >= Duration::from_millis(250),
        "six calls finished in {:?}",
        started.elapsed()
    );
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_call_never_runs_without_token() {
    let governor = governor(1, 1, 60_000);
    assert!(governor.try_acquire());

    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let counter = Arc::clone(&calls);
    let result = governor
        .execute("extract_text", &fast_policy(), &cancel, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>(())
            }
        })
        .await;

    assert_eq!(result.unwrap_err().category, ErrorCategory::Canceled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limited_error_retried_then_succeeds() {
    let governor = governor(10, 10, 1_000);
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let value = governor
        .execute("analyze", &fast_policy(), &cancel, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CallError::new(ErrorCategory::RateLimited, "429 Too Many Requests"))
                } else {
                    Ok("structured")
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "structured");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_auth_error_fails_fast() {
    let governor = governor(10, 10, 1_000);
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let err = governor
        .execute("analyze", &fast_policy(), &cancel, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CallError::new(ErrorCategory::Auth, "401 Unauthorized"))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::Auth);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
