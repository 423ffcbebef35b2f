// tests/facade.rs

mod common;
use crate::common::{as_compilers, init_tracing};

use std::sync::Arc;

use multic::errors::MulticError;
use multic::fs::mock::MockFileSystem;
use multic::hooks::MultiEvent;
use multic::multi::MultiCompiler;
use multic::unit::Compiler;
use multic_test_utils::{new_run_log, with_timeout, FakeCompilerBuilder};

#[tokio::test]
async fn output_path_is_the_longest_common_prefix() {
    init_tracing();
    let log = new_run_log();
    let app1 = FakeCompilerBuilder::new("app1", &log).output("/proj/dist/app1").build();
    let app2 = FakeCompilerBuilder::new("app2", &log).output("/proj/dist/app2").build();
    let multi = MultiCompiler::new(as_compilers(&[&app1, &app2]));

    assert_eq!(multi.output_path().to_string_lossy(), "/proj/dist");
}

#[tokio::test]
async fn file_system_setters_fan_out_and_aggregate_reads_are_ambiguous() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).build();
    let b = FakeCompilerBuilder::new("b", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&a, &b]));

    let mock = MockFileSystem::new();
    multi.set_input_file_system(Arc::new(mock.clone()));
    multi.set_output_file_system(Arc::new(mock.clone()));

    assert!(a.input_file_system().is_some());
    assert!(b.input_file_system().is_some());
    assert!(a.output_file_system().is_some());
    assert!(b.output_file_system().is_some());

    let err = multi.input_file_system().unwrap_err();
    assert!(matches!(err, MulticError::AmbiguousFileSystemRead("inputFileSystem")));
    let err = multi.output_file_system().unwrap_err();
    assert!(matches!(err, MulticError::AmbiguousFileSystemRead("outputFileSystem")));

    // Purge reaches every compiler's injected input file system.
    multi.purge_input_file_system();
    assert_eq!(mock.purge_count(), 2);
}

#[tokio::test]
async fn aggregate_done_hook_fires_once_every_compiler_is_done() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).delay_ms(5).build();
    let b = FakeCompilerBuilder::new("b", &log).after("a").delay_ms(5).build();
    let multi = MultiCompiler::new(as_compilers(&[&a, &b]));
    let mut hooks_rx = multi.hooks().subscribe();

    with_timeout(multi.run()).await.unwrap();

    let done = with_timeout(async {
        loop {
            match hooks_rx.recv().await {
                Ok(MultiEvent::Done(report)) => break report,
                Ok(_) => continue,
                Err(err) => panic!("hook stream ended early: {err}"),
            }
        }
    })
    .await;
    assert_eq!(done.compiler_names().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn per_compiler_lifecycle_events_are_forwarded_with_names() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&a]));
    let mut hooks_rx = multi.hooks().subscribe();

    a.emit_invalid();

    let forwarded = with_timeout(async {
        loop {
            match hooks_rx.recv().await {
                Ok(MultiEvent::Invalid { compiler }) => break compiler,
                Ok(_) => continue,
                Err(err) => panic!("hook stream ended early: {err}"),
            }
        }
    })
    .await;
    assert_eq!(forwarded, "a");
}

#[tokio::test]
async fn infrastructure_logger_publishes_on_the_aggregate_bus() {
    init_tracing();
    let log = new_run_log();
    let a = FakeCompilerBuilder::new("a", &log).build();
    let multi = MultiCompiler::new(as_compilers(&[&a]));
    let mut hooks_rx = multi.hooks().subscribe();

    multi.infrastructure_logger("cli").log("hello");

    let (logger, message) = with_timeout(async {
        loop {
            match hooks_rx.recv().await {
                Ok(MultiEvent::InfrastructureLog { compiler, logger, message }) => {
                    assert!(compiler.is_none(), "facade lines carry no compiler name");
                    break (logger, message);
                }
                Ok(_) => continue,
                Err(err) => panic!("hook stream ended early: {err}"),
            }
        }
    })
    .await;
    assert_eq!(logger, "cli");
    assert_eq!(message, "hello");
}
