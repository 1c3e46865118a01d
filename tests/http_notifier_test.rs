//! Reload endpoint retry behaviour against a local mock server.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use configmap_reloader::config::HttpRetryConfig;
use configmap_reloader::reload::{AttemptError, HttpNotifier, ReloadError};

use common::{closed_port, fast_retry, start_counting_backend, start_programmable_backend};

#[tokio::test]
async fn test_reload_succeeds_first_try() {
    let (addr, hits) = start_counting_backend().await;
    let notifier =
        HttpNotifier::new(&format!("http://{}/-/reload", addr), "", fast_retry(2_000)).unwrap();

    notifier.reload().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reload_retries_until_ok() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                500
            } else {
                200
            }
        }
    })
    .await;

    let notifier = HttpNotifier::new(
        &format!("http://{}/-/reload", addr),
        "POST",
        HttpRetryConfig::default(),
    )
    .unwrap();

    let started = Instant::now();
    notifier.reload().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_non_200_success_codes_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                204
            } else {
                200
            }
        }
    })
    .await;

    let notifier =
        HttpNotifier::new(&format!("http://{}/", addr), "POST", fast_retry(2_000)).unwrap();
    notifier.reload().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_configured_method_is_sent() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let addr = start_programmable_backend(move |method| {
        recorder.lock().unwrap().push(method);
        async { 200 }
    })
    .await;

    let notifier =
        HttpNotifier::new(&format!("http://{}/reload", addr), "PUT", fast_retry(2_000)).unwrap();
    notifier.reload().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["PUT".to_string()]);
}

#[tokio::test]
async fn test_gives_up_when_budget_spent() {
    let addr = start_programmable_backend(|_| async { 500 }).await;

    let notifier =
        HttpNotifier::new(&format!("http://{}/-/reload", addr), "POST", fast_retry(500)).unwrap();

    let started = Instant::now();
    let err = notifier.reload().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(3));
    match err {
        ReloadError::RetriesExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert!(attempts >= 2);
            assert!(matches!(last_error, AttemptError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_fails() {
    let addr = closed_port().await;
    let notifier =
        HttpNotifier::new(&format!("http://{}/-/reload", addr), "POST", fast_retry(300)).unwrap();

    let err = notifier.reload().await.unwrap_err();
    match err {
        ReloadError::RetriesExhausted { last_error, .. } => {
            assert!(matches!(last_error, AttemptError::Request { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_default_budget_is_bounded() {
    let addr = start_programmable_backend(|_| async { 503 }).await;
    let notifier = HttpNotifier::new(
        &format!("http://{}/-/reload", addr),
        "POST",
        HttpRetryConfig::default(),
    )
    .unwrap();

    let started = Instant::now();
    let result = notifier.reload().await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(12));
}
