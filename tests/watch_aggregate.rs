// tests/watch_aggregate.rs

mod common;
use crate::common::{as_compilers, init_tracing};

use std::time::Duration;

use multic::errors::MulticError;
use multic::hooks::MultiEvent;
use multic::multi::MultiCompiler;
use multic::report::MultiReport;
use multic::unit::WatchOptions;
use multic::watch::WatchNotification;
use multic_test_utils::{new_run_log, with_timeout, FakeCompilerBuilder};

use tokio::sync::mpsc;
use tokio::time::sleep;

/// Wait for the next aggregate notification, failing on errors.
async fn next_built(rx: &mut mpsc::Receiver<WatchNotification>) -> MultiReport {
    match with_timeout(rx.recv()).await {
        Some(WatchNotification::Built(report)) => report,
        Some(WatchNotification::Failed(err)) => panic!("unexpected watch error: {err}"),
        None => panic!("watch handler channel closed"),
    }
}

/// Let in-flight events settle, then assert nothing was announced.
async fn assert_no_notification(rx: &mut mpsc::Receiver<WatchNotification>) {
    sleep(Duration::from_millis(60)).await;
    assert!(
        rx.try_recv().is_err(),
        "no aggregate notification was expected yet"
    );
}

#[tokio::test]
async fn dependent_watch_loop_starts_only_after_first_build() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let y = FakeCompilerBuilder::new("y", &log).after("x").build();
    let multi = MultiCompiler::new(as_compilers(&[&x, &y]));

    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let _watching = multi.watch(WatchOptions::default(), tx).unwrap();

    sleep(Duration::from_millis(50)).await;
    assert!(x.watch_started());
    assert!(!y.watch_started(), "y must wait for x's first build");

    x.emit_build().await;
    sleep(Duration::from_millis(50)).await;
    assert!(y.watch_started());

    // One fresh compiler is not enough for an aggregate.
    assert_no_notification(&mut rx).await;

    y.emit_build().await;
    let report = next_built(&mut rx).await;
    assert_eq!(report.compiler_names().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[tokio::test]
async fn second_aggregate_requires_every_invalidated_compiler_to_rebuild() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let y = FakeCompilerBuilder::new("y", &log).after("x").build();
    let multi = MultiCompiler::new(as_compilers(&[&x, &y]));

    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let _watching = multi.watch(WatchOptions::default(), tx).unwrap();

    sleep(Duration::from_millis(50)).await;
    x.emit_build().await;
    sleep(Duration::from_millis(50)).await;
    y.emit_build().await;
    next_built(&mut rx).await;

    // Both invalidate; one rebuild alone must not re-aggregate.
    x.emit_invalid();
    y.emit_invalid();
    sleep(Duration::from_millis(50)).await;
    x.emit_build().await;
    assert_no_notification(&mut rx).await;

    y.emit_build().await;
    let report = next_built(&mut rx).await;
    assert_eq!(report.compiler_names().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[tokio::test]
async fn compiler_left_stable_is_not_relisted_in_the_next_aggregate() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let y = FakeCompilerBuilder::new("y", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&x, &y]));

    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let _watching = multi.watch(WatchOptions::default(), tx).unwrap();

    sleep(Duration::from_millis(50)).await;
    x.emit_build().await;
    y.emit_build().await;
    next_built(&mut rx).await;

    // Only x invalidates and rebuilds; y stays stable and is not
    // re-listed, but its stable result still lets the aggregate fire.
    x.emit_invalid();
    sleep(Duration::from_millis(50)).await;
    x.emit_build().await;
    let report = next_built(&mut rx).await;
    assert_eq!(report.compiler_names().collect::<Vec<_>>(), vec!["x"]);
}

#[tokio::test]
async fn watch_errors_are_forwarded_without_stopping_siblings() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let y = FakeCompilerBuilder::new("y", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&x, &y]));

    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let _watching = multi.watch(WatchOptions::default(), tx).unwrap();
    sleep(Duration::from_millis(50)).await;

    x.emit_watch_error("scripted watch failure").await;
    match with_timeout(rx.recv()).await {
        Some(WatchNotification::Failed(MulticError::UnitAction { compiler, .. })) => {
            assert_eq!(compiler, "x");
        }
        other => panic!("expected a forwarded unit error, got {other:?}"),
    }

    // Both loops are still alive and can complete an aggregate.
    x.emit_build().await;
    y.emit_build().await;
    let report = next_built(&mut rx).await;
    assert_eq!(report.compiler_names().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[tokio::test]
async fn close_stops_every_loop_and_fires_the_watch_close_hook() {
    init_tracing();
    let log = new_run_log();
    let x = FakeCompilerBuilder::new("x", &log).build();
    let y = FakeCompilerBuilder::new("y", &log).after("x").build();
    let multi = MultiCompiler::new(as_compilers(&[&x, &y]));
    let mut hooks_rx = multi.hooks().subscribe();

    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let watching = multi.watch(WatchOptions::default(), tx).unwrap();

    sleep(Duration::from_millis(50)).await;
    x.emit_build().await;
    sleep(Duration::from_millis(50)).await;
    y.emit_build().await;
    next_built(&mut rx).await;

    with_timeout(watching.close()).await.unwrap();
    assert!(x.watch_closed());
    assert!(y.watch_closed());
    assert!(!multi.is_running());

    // The aggregate watch-close hook fires after all handles closed.
    let saw_close = with_timeout(async {
        loop {
            match hooks_rx.recv().await {
                Ok(MultiEvent::WatchClose) => break true,
                Ok(_) => continue,
                Err(_) => break false,
            }
        }
    })
    .await;
    assert!(saw_close);
}
