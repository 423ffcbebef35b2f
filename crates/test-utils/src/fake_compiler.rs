use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{broadcast, mpsc};

use multic::fs::FileSystem;
use multic::report::BuildReport;
use multic::unit::{BoxFuture, Compiler, CompilerEvent, WatchOptions, WatchOutcome, Watching};

use crate::builders::RunLog;

/// A scriptable in-memory compiler:
///
/// - `run` records `start:<name>` / `done:<name>` in the shared run log,
///   sleeps for the configured delay, then succeeds or fails;
/// - `watch` records `watch:<name>` and hands the test a sink it can
///   push build outcomes through via [`FakeCompiler::emit_build`];
/// - `emit_invalid` fires the `invalid` lifecycle event.
pub struct FakeCompiler {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) output_path: PathBuf,
    pub(crate) delay: Duration,
    pub(crate) fail: bool,
    pub(crate) log: RunLog,
    pub(crate) events: broadcast::Sender<CompilerEvent>,
    watch_sink: Arc<Mutex<Option<mpsc::Sender<WatchOutcome>>>>,
    watch_started: Arc<AtomicBool>,
    watch_closed: Arc<AtomicBool>,
    input_fs: Mutex<Option<Arc<dyn FileSystem>>>,
    output_fs: Mutex<Option<Arc<dyn FileSystem>>>,
}

impl FakeCompiler {
    pub(crate) fn new(
        name: String,
        dependencies: Vec<String>,
        output_path: PathBuf,
        delay: Duration,
        fail: bool,
        log: RunLog,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            name,
            dependencies,
            output_path,
            delay,
            fail,
            log,
            events,
            watch_sink: Arc::new(Mutex::new(None)),
            watch_started: Arc::new(AtomicBool::new(false)),
            watch_closed: Arc::new(AtomicBool::new(false)),
            input_fs: Mutex::new(None),
            output_fs: Mutex::new(None),
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    /// Whether `watch` has been called on this compiler.
    pub fn watch_started(&self) -> bool {
        self.watch_started.load(Ordering::Acquire)
    }

    /// Whether the watch handle has been closed.
    pub fn watch_closed(&self) -> bool {
        self.watch_closed.load(Ordering::Acquire)
    }

    /// Push one successful watch-mode build through the loop, emitting
    /// the `watchRun` and `done` lifecycle events around it.
    pub async fn emit_build(&self) {
        let sink = self
            .watch_sink
            .lock()
            .unwrap()
            .clone()
            .expect("emit_build before watch started");
        let report = BuildReport::bare(&self.name);

        let _ = self.events.send(CompilerEvent::WatchRun);
        sink.send(Ok(report.clone()))
            .await
            .expect("watch outcome sink closed");
        let _ = self.events.send(CompilerEvent::Done(report));
    }

    /// Push one failed watch-mode build through the loop.
    pub async fn emit_watch_error(&self, message: &str) {
        let sink = self
            .watch_sink
            .lock()
            .unwrap()
            .clone()
            .expect("emit_watch_error before watch started");
        sink.send(Err(anyhow!("{message}")))
            .await
            .expect("watch outcome sink closed");
    }

    /// Fire the `invalid` lifecycle event.
    pub fn emit_invalid(&self) {
        let _ = self.events.send(CompilerEvent::Invalid);
    }
}

impl Compiler for FakeCompiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn output_path(&self) -> PathBuf {
        self.output_path.clone()
    }

    fn run(&self) -> BoxFuture<'_, anyhow::Result<BuildReport>> {
        Box::pin(async move {
            self.record(format!("start:{}", self.name));
            let _ = self.events.send(CompilerEvent::Run);

            tokio::time::sleep(self.delay).await;

            if self.fail {
                self.record(format!("fail:{}", self.name));
                return Err(anyhow!("compiler '{}' was scripted to fail", self.name));
            }

            let report = BuildReport {
                compiler: self.name.clone(),
                duration: self.delay,
                summary: None,
            };
            self.record(format!("done:{}", self.name));
            let _ = self.events.send(CompilerEvent::Done(report.clone()));
            Ok(report)
        })
    }

    fn watch(
        &self,
        _options: WatchOptions,
        outcomes: mpsc::Sender<WatchOutcome>,
    ) -> anyhow::Result<Box<dyn Watching>> {
        *self.watch_sink.lock().unwrap() = Some(outcomes);
        self.watch_started.store(true, Ordering::Release);
        self.record(format!("watch:{}", self.name));

        Ok(Box::new(FakeWatching {
            sink: Arc::clone(&self.watch_sink),
            closed: Arc::clone(&self.watch_closed),
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<CompilerEvent> {
        self.events.subscribe()
    }

    fn set_input_file_system(&self, fs: Arc<dyn FileSystem>) {
        *self.input_fs.lock().unwrap() = Some(fs);
    }

    fn set_output_file_system(&self, fs: Arc<dyn FileSystem>) {
        *self.output_fs.lock().unwrap() = Some(fs);
    }

    fn input_file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.input_fs.lock().unwrap().clone()
    }

    fn output_file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.output_fs.lock().unwrap().clone()
    }
}

/// Watch handle returned by [`FakeCompiler::watch`].
struct FakeWatching {
    sink: Arc<Mutex<Option<mpsc::Sender<WatchOutcome>>>>,
    closed: Arc<AtomicBool>,
}

impl Watching for FakeWatching {
    fn invalidate(&mut self) {
        // Fakes rebuild only when the test says so.
    }

    fn close(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            // Dropping the sink ends the orchestrator's outcome pump.
            self.sink.lock().unwrap().take();
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}
