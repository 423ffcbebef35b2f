// src/multi.rs

//! The aggregate compiler facade.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::dag::{graph, topo};
use crate::errors::{MulticError, Result};
use crate::fs::FileSystem;
use crate::hooks::{MultiEvent, MultiHooks};
use crate::paths;
use crate::report::{BuildReport, MultiReport};
use crate::unit::{Compiler, WatchOptionsSpec};
use crate::watch::{self, MultiWatching, WatchNotification};

/// Orchestrates a set of compilers: validates their dependency graph,
/// runs them to completion (or continuously) in dependency order, and
/// aggregates one report per compiler.
///
/// At most one run or watch session is active per instance at any time;
/// a second invocation is rejected with
/// [`MulticError::ConcurrentCompilation`].
pub struct MultiCompiler {
    compilers: Vec<Arc<dyn Compiler>>,
    hooks: MultiHooks,
    running: Arc<AtomicBool>,
}

impl MultiCompiler {
    /// Wrap a set of externally-owned compilers.
    ///
    /// Subscribes to every compiler's lifecycle stream, so this must be
    /// called within a tokio runtime.
    pub fn new(compilers: Vec<Arc<dyn Compiler>>) -> Self {
        let hooks = MultiHooks::wire(&compilers);
        Self {
            compilers,
            hooks,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn compilers(&self) -> &[Arc<dyn Compiler>] {
        &self.compilers
    }

    /// Aggregate lifecycle hooks: done, watch-close, and the forwarded
    /// per-compiler events.
    pub fn hooks(&self) -> &MultiHooks {
        &self.hooks
    }

    /// Whether a run or watch session is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check that every declared dependency resolves and that the graph
    /// is acyclic. Missing-dependency errors come first, then the sorted
    /// cycle listing, all in a single report.
    pub fn validate_dependencies(&self) -> Result<()> {
        graph::validate(&self.compilers).map_err(MulticError::InvalidDependencyGraph)
    }

    /// Build every compiler once, in dependency order.
    ///
    /// Returns one report per compiler, index-aligned with the compiler
    /// list regardless of completion order. The first failure aborts the
    /// remaining schedule; in-flight siblings finish on their own and
    /// their results are discarded.
    pub async fn run(&self) -> Result<MultiReport> {
        if self.is_running() {
            return Err(MulticError::ConcurrentCompilation);
        }
        self.validate_dependencies()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MulticError::ConcurrentCompilation);
        }

        info!(compilers = self.compilers.len(), "starting one-shot run");
        let result = self.run_all().await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_all(&self) -> Result<MultiReport> {
        let count = self.compilers.len();
        let slots: Arc<Mutex<Vec<Option<BuildReport>>>> = Arc::new(Mutex::new(vec![None; count]));

        {
            let slots = Arc::clone(&slots);
            topo::run_with_dependencies(&self.compilers, move |idx, compiler| {
                let slots = Arc::clone(&slots);
                Box::pin(async move {
                    let report =
                        compiler
                            .run()
                            .await
                            .map_err(|source| MulticError::UnitAction {
                                compiler: compiler.name().to_string(),
                                source,
                            })?;
                    slots.lock().await[idx] = Some(report);
                    Ok(())
                })
            })
            .await?;
        }

        let mut slots = slots.lock().await;
        let mut reports = Vec::with_capacity(count);
        for (slot, compiler) in slots.iter_mut().zip(&self.compilers) {
            match slot.take() {
                Some(report) => reports.push(report),
                None => {
                    return Err(anyhow!(
                        "missing report for compiler '{}' after a successful run",
                        compiler.name()
                    )
                    .into());
                }
            }
        }
        Ok(MultiReport::new(reports))
    }

    /// Start watch mode. Rebuild outcomes and aggregate notifications
    /// are delivered through `handler`; the returned handle closes the
    /// session.
    ///
    /// Each compiler's watch loop starts only once all of its
    /// dependencies have completed their first successful build.
    pub fn watch(
        &self,
        options: impl Into<WatchOptionsSpec>,
        handler: mpsc::Sender<WatchNotification>,
    ) -> Result<MultiWatching> {
        if self.is_running() {
            return Err(MulticError::ConcurrentCompilation);
        }
        self.validate_dependencies()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MulticError::ConcurrentCompilation);
        }

        info!(compilers = self.compilers.len(), "starting watch session");
        Ok(watch::start(
            self.compilers.clone(),
            options.into(),
            handler,
            Arc::clone(&self.running),
            self.hooks.clone(),
        ))
    }

    /// Longest common prefix of all compilers' output paths.
    pub fn output_path(&self) -> PathBuf {
        let paths: Vec<String> = self
            .compilers
            .iter()
            .map(|c| c.output_path().to_string_lossy().into_owned())
            .collect();
        PathBuf::from(paths::common_output_path(paths.iter().map(String::as_str)))
    }

    /// Apply an input file system to every compiler.
    pub fn set_input_file_system(&self, fs: Arc<dyn FileSystem>) {
        for compiler in &self.compilers {
            compiler.set_input_file_system(Arc::clone(&fs));
        }
    }

    /// Apply an output file system to every compiler.
    pub fn set_output_file_system(&self, fs: Arc<dyn FileSystem>) {
        for compiler in &self.compilers {
            compiler.set_output_file_system(Arc::clone(&fs));
        }
    }

    /// There is no single input file system on the aggregate; read the
    /// individual compilers instead.
    pub fn input_file_system(&self) -> Result<Arc<dyn FileSystem>> {
        Err(MulticError::AmbiguousFileSystemRead("inputFileSystem"))
    }

    /// There is no single output file system on the aggregate.
    pub fn output_file_system(&self) -> Result<Arc<dyn FileSystem>> {
        Err(MulticError::AmbiguousFileSystemRead("outputFileSystem"))
    }

    /// Drop cached input state on every compiler that has an input file
    /// system injected.
    pub fn purge_input_file_system(&self) {
        for compiler in &self.compilers {
            if let Some(fs) = compiler.input_file_system() {
                fs.purge();
            }
        }
    }

    /// Named logger publishing through the aggregate infrastructure-log
    /// hook and `tracing`.
    pub fn infrastructure_logger(&self, name: impl Into<String>) -> InfraLogger {
        InfraLogger {
            name: name.into(),
            hooks: self.hooks.clone(),
        }
    }
}

/// Logger returned by [`MultiCompiler::infrastructure_logger`].
pub struct InfraLogger {
    name: String,
    hooks: MultiHooks,
}

impl InfraLogger {
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(logger = %self.name, "{message}");
        self.hooks.emit(MultiEvent::InfrastructureLog {
            compiler: None,
            logger: self.name.clone(),
            message,
        });
    }
}
