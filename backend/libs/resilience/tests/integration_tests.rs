/// Integration tests for resilience library
use resilience::{
    backoff::ExponentialBackoff,
    presets,
    retry::{with_retry, with_retry_if, RetryConfig, RetryError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ==================== Backoff Tests ====================

#[tokio::test]
async fn test_backoff_drives_retry_loop_until_budget_spent() {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(10),
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_interval: Duration::from_millis(40),
        max_elapsed_time: Some(Duration::from_millis(120)),
    };

    let start = Instant::now();
    let mut backoff = policy.start();
    let mut attempts = 0;

    loop {
        attempts += 1; // operation "fails" every time
        match backoff.next_delay() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => break,
        }
    }

    // Gives up only once the budget is exhausted, never before
    assert!(start.elapsed() >= Duration::from_millis(120));
    assert!(attempts > 1);
}

#[tokio::test]
async fn test_backoff_without_budget_never_stops() {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(1),
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut backoff = policy.start();
    for _ in 0..100 {
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1)));
    }
}

// ==================== Retry Tests ====================

#[tokio::test]
async fn test_retry_success_after_transient_failures() {
    let config = RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(10),
        jitter: false,
        ..Default::default()
    };

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry(config, move || {
        let count = counter_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            if count < 2 {
                Err("temporary error")
            } else {
                Ok(42)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exponential_backoff_timing() {
    let config = RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
        ..Default::default()
    };

    let start = Instant::now();

    let result = with_retry(config, || async { Err::<i32, _>("error") }).await;

    // Expected: 10ms + 20ms + 40ms = 70ms minimum
    assert!(start.elapsed() >= Duration::from_millis(70));
    assert_eq!(result.unwrap_err().into_inner(), "error");
}

#[tokio::test]
async fn test_retry_if_does_not_retry_permanent_errors() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        presets::http_provider_retry(),
        |status: &u16| *status >= 500,
        move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), u16>(400) }
        },
    )
    .await;

    assert!(matches!(result, Err(RetryError::OperationFailed(400))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
