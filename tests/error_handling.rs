use benchmesh::error::{self, RetryPolicy};
use benchmesh::BenchError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fast_policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_delay: Some(Duration::from_millis(4)),
    }
}

fn unavailable() -> BenchError {
    BenchError::Unavailable {
        address: "worker-0.run.svc.cluster.local:5000".to_string(),
        message: "connection refused".to_string(),
    }
}

#[tokio::test]
async fn test_retry_async_eventually_succeeds() {
    let attempts = AtomicUsize::new(0);
    let result = error::retry_async(
        || async {
            let a = attempts.fetch_add(1, Ordering::SeqCst);
            if a < 2 {
                Err(unavailable())
            } else {
                Ok(42u32)
            }
        },
        &fast_policy(10),
    )
    .await
    .expect("retry should succeed");
    assert_eq!(result, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_stops_on_other_errors() {
    let attempts = AtomicUsize::new(0);
    let err = error::retry_async(
        || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(BenchError::phase("setup-worker", "bad args"))
        },
        &fast_policy(10),
    )
    .await
    .unwrap_err();
    assert_eq!(err, BenchError::phase("setup-worker", "bad args"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_is_a_connectivity_error() {
    let attempts = AtomicUsize::new(0);
    let err = error::retry_async(
        || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(unavailable())
        },
        &fast_policy(4),
    )
    .await
    .unwrap_err();
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    match err {
        BenchError::Connectivity(message) => {
            assert!(message.contains("after 4 attempts"));
            assert!(message.contains("worker-0.run"));
        }
        other => panic!("expected connectivity error, got {:?}", other),
    }
}

#[test]
fn test_default_backoff_schedule() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 10);
    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(4), Duration::from_secs(8));
}

#[test]
fn test_user_friendly_messages() {
    assert!(error::is_retryable_error(&unavailable()));
    assert!(!error::is_retryable_error(&BenchError::Connectivity("x".into())));

    let msg = error::user_friendly_message(&BenchError::Provisioning("quota exceeded".into()));
    assert!(msg.contains("provision"));

    let msg = error::user_friendly_message(&BenchError::ThresholdViolation {
        benchmark: "Get".to_string(),
        mean: Duration::from_millis(15),
        max: Duration::from_millis(10),
    });
    assert!(msg.contains("mean latency of 15ms"));
    assert!(msg.contains("maximum of 10ms"));
}

#[test]
fn test_threshold_message_at_equality() {
    let err = BenchError::ThresholdViolation {
        benchmark: "Get".to_string(),
        mean: Duration::from_millis(10),
        max: Duration::from_millis(10),
    };
    assert_eq!(
        err.to_string(),
        "mean latency of 10ms for benchmark Get meets or exceeds the maximum of 10ms"
    );
}
