// tests/concurrent_guard.rs

mod common;
use crate::common::{as_compilers, init_tracing};

use std::sync::Arc;
use std::time::Duration;

use multic::errors::MulticError;
use multic::multi::MultiCompiler;
use multic::unit::WatchOptions;
use multic::watch::WatchNotification;
use multic_test_utils::{new_run_log, with_timeout, FakeCompilerBuilder};

use tokio::sync::mpsc;
use tokio::time::sleep;

#[tokio::test]
async fn second_run_while_running_is_rejected_without_touching_units() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).delay_ms(200).build();
    let multi = Arc::new(MultiCompiler::new(as_compilers(&[&a])));

    let first = {
        let multi = Arc::clone(&multi);
        tokio::spawn(async move { multi.run().await })
    };
    sleep(Duration::from_millis(50)).await;
    assert!(multi.is_running());

    let err = multi.run().await.unwrap_err();
    assert!(matches!(err, MulticError::ConcurrentCompilation));
    // The rejected call must not have dispatched anything.
    assert_eq!(*log.lock().unwrap(), vec!["start:a"]);

    with_timeout(first).await.unwrap().unwrap();
    assert!(!multi.is_running());

    // The guard is released; running again is fine.
    with_timeout(multi.run()).await.unwrap();
}

#[tokio::test]
async fn watch_while_running_is_rejected() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).delay_ms(200).build();
    let multi = Arc::new(MultiCompiler::new(as_compilers(&[&a])));

    let first = {
        let multi = Arc::clone(&multi);
        tokio::spawn(async move { multi.run().await })
    };
    sleep(Duration::from_millis(50)).await;

    let (tx, _rx) = mpsc::channel::<WatchNotification>(4);
    let err = multi.watch(WatchOptions::default(), tx).unwrap_err();
    assert!(matches!(err, MulticError::ConcurrentCompilation));
    assert!(!a.watch_started());

    with_timeout(first).await.unwrap().unwrap();
}

#[tokio::test]
async fn run_while_watching_is_rejected_until_the_session_closes() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&x]));

    let (tx, _rx) = mpsc::channel::<WatchNotification>(4);
    let watching = multi.watch(WatchOptions::default(), tx).unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(multi.is_running());
    assert!(x.watch_started());

    let err = multi.run().await.unwrap_err();
    assert!(matches!(err, MulticError::ConcurrentCompilation));

    with_timeout(watching.close()).await.unwrap();
    assert!(x.watch_closed());
    assert!(!multi.is_running());

    with_timeout(multi.run()).await.unwrap();
}
