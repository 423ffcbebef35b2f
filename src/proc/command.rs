// src/proc/command.rs

//! Shell-command-backed compiler.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::config::model::CompilerSection;
use crate::fs::FileSystem;
use crate::proc::patterns::ChangePatterns;
use crate::proc::watch::{spawn_change_watcher, ChangeWatcher};
use crate::report::BuildReport;
use crate::unit::{
    BoxFuture, Compiler, CompilerEvent, WatchOptions, WatchOutcome, Watching,
};

/// A compiler that builds by running a shell command.
///
/// In watch mode it rebuilds whenever a filesystem change matches its
/// watch patterns (or `invalidate` is called on the handle), debounced
/// per [`WatchOptions`].
pub struct ProcessCompiler {
    inner: Arc<ProcInner>,
    dependencies: Vec<String>,
    output: PathBuf,
    patterns: ChangePatterns,
    input_fs: Mutex<Option<Arc<dyn FileSystem>>>,
    output_fs: Mutex<Option<Arc<dyn FileSystem>>>,
}

/// The parts of the compiler the watch loop needs to keep using after
/// `watch` returns.
struct ProcInner {
    name: String,
    cmd: String,
    workdir: PathBuf,
    events: broadcast::Sender<CompilerEvent>,
}

impl ProcessCompiler {
    pub fn new(
        name: impl Into<String>,
        cmd: impl Into<String>,
        workdir: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        dependencies: Vec<String>,
        patterns: ChangePatterns,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(ProcInner {
                name: name.into(),
                cmd: cmd.into(),
                workdir: workdir.into(),
                events,
            }),
            dependencies,
            output: output.into(),
            patterns,
            input_fs: Mutex::new(None),
            output_fs: Mutex::new(None),
        }
    }

    /// Build a compiler from a `[compiler.<name>]` config section.
    /// Relative `workdir`/`output` paths are resolved against `root`
    /// (the config file's directory).
    pub fn from_section(name: &str, section: &CompilerSection, root: &Path) -> Result<Self> {
        let workdir = match &section.workdir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };
        let output = match &section.output {
            Some(out) => workdir.join(out),
            None => workdir.clone(),
        };
        let patterns = ChangePatterns::compile(&section.watch, &section.exclude)
            .with_context(|| format!("compiling watch patterns for compiler '{name}'"))?;

        Ok(Self::new(
            name,
            section.cmd.clone(),
            workdir,
            output,
            section.after.clone(),
            patterns,
        ))
    }
}

impl ProcInner {
    fn emit(&self, event: CompilerEvent) {
        // Err just means nobody is subscribed.
        let _ = self.events.send(event);
    }

    async fn build_once(&self) -> Result<BuildReport> {
        let started = Instant::now();
        info!(compiler = %self.name, cmd = %self.cmd, "starting build command");

        // Shell command appropriate for the platform.
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        let output = command
            .current_dir(&self.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning process for compiler '{}'", self.name))?;

        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").to_string();
            return Err(anyhow!(
                "command for compiler '{}' exited with code {code}: {last_line}",
                self.name
            ));
        }

        debug!(compiler = %self.name, exit_code = code, "build command succeeded");
        Ok(BuildReport {
            compiler: self.name.clone(),
            duration: started.elapsed(),
            summary: Some(format!("exit code {code}")),
        })
    }
}

impl Compiler for ProcessCompiler {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone()
    }

    fn run(&self) -> BoxFuture<'_, Result<BuildReport>> {
        Box::pin(async move {
            self.inner.emit(CompilerEvent::Run);
            let report = self.inner.build_once().await?;
            self.inner.emit(CompilerEvent::Done(report.clone()));
            Ok(report)
        })
    }

    fn watch(
        &self,
        options: WatchOptions,
        outcomes: mpsc::Sender<WatchOutcome>,
    ) -> Result<Box<dyn Watching>> {
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(16);

        let watcher = if self.patterns.is_empty() {
            None
        } else {
            Some(spawn_change_watcher(
                self.inner.workdir.clone(),
                self.patterns.clone(),
                trigger_tx.clone(),
            )?)
        };

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            watch_loop(inner, options, trigger_rx, stop_rx, outcomes, watcher).await;
        });

        Ok(Box::new(ProcWatching {
            name: self.inner.name.clone(),
            stop: Some(stop_tx),
            trigger: trigger_tx,
            task: Some(task),
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<CompilerEvent> {
        self.inner.events.subscribe()
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

/// The rebuild loop: initial build, then change-triggered, debounced
/// rebuilds until told to stop.
async fn watch_loop(
    inner: Arc<ProcInner>,
    options: WatchOptions,
    mut trigger_rx: mpsc::Receiver<()>,
    mut stop_rx: oneshot::Receiver<()>,
    outcomes: mpsc::Sender<WatchOutcome>,
    watcher: Option<ChangeWatcher>,
) {
    // Keep the filesystem watcher alive for the lifetime of the loop.
    let _watcher = watcher;

    inner.emit(CompilerEvent::WatchRun);
    let outcome = inner.build_once().await;
    if let Ok(report) = &outcome {
        inner.emit(CompilerEvent::Done(report.clone()));
    }
    if outcomes.send(outcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!(compiler = %inner.name, "watch loop stopping");
                return;
            }
            changed = trigger_rx.recv() => {
                if changed.is_none() {
                    return;
                }
                inner.emit(CompilerEvent::Invalid);

                // Debounce: absorb further changes within the quiet period.
                let quiet = Duration::from_millis(options.debounce_ms);
                loop {
                    tokio::select! {
                        _ = &mut stop_rx => return,
                        _ = sleep(quiet) => break,
                        more = trigger_rx.recv() => {
                            if more.is_none() {
                                break;
                            }
                        }
                    }
                }

                inner.emit(CompilerEvent::WatchRun);
                let outcome = inner.build_once().await;
                if let Ok(report) = &outcome {
                    inner.emit(CompilerEvent::Done(report.clone()));
                }
                if outcomes.send(outcome).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Handle over one [`ProcessCompiler`] watch loop.
struct ProcWatching {
    name: String,
    stop: Option<oneshot::Sender<()>>,
    trigger: mpsc::Sender<()>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Watching for ProcWatching {
    fn invalidate(&mut self) {
        // A full trigger queue already guarantees a rebuild is coming.
        let _ = self.trigger.try_send(());
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            if let Some(task) = self.task.take() {
                task.await
                    .with_context(|| format!("joining watch loop for compiler '{}'", self.name))?;
            }
            Ok(())
        })
    }
}
