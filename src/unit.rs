// src/unit.rs

//! The consumed compiler contract.
//!
//! `multic` orchestrates build units it does not own. A unit is anything
//! implementing [`Compiler`]: it has a unique name, an optional list of
//! dependency names, a one-shot `run`, and a `watch` loop that keeps
//! rebuilding and reporting outcomes until its handle is closed. How a
//! unit actually compiles is its own business.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::fs::FileSystem;
use crate::report::BuildReport;

/// Boxed future used by the object-safe async trait methods below.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a single watch-mode (re)build.
pub type WatchOutcome = anyhow::Result<BuildReport>;

/// Lifecycle notifications emitted by a compiler.
///
/// The orchestrator only listens: it never fires these on a compiler's
/// behalf. `Done` and `Invalid` drive the aggregate done bookkeeping and
/// the watch freshness ledger; the rest are forwarded verbatim on the
/// aggregate bus.
#[derive(Debug, Clone)]
pub enum CompilerEvent {
    /// A build finished with this report.
    Done(BuildReport),
    /// A previously reported result became invalid (an input changed).
    Invalid,
    /// A one-shot run is starting.
    Run,
    /// A watch-mode (re)build is starting.
    WatchRun,
    /// Infrastructure-level log line.
    InfrastructureLog { logger: String, message: String },
}

/// Watch tuning passed to [`Compiler::watch`].
#[derive(Debug, Clone, Deserialize)]
pub struct WatchOptions {
    /// Quiet period after a change before rebuilding, in milliseconds.
    /// Further changes within the period restart it.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    200
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// One shared options value for every compiler, or one per compiler
/// (index-aligned with the compiler list).
#[derive(Debug, Clone)]
pub enum WatchOptionsSpec {
    Shared(WatchOptions),
    PerCompiler(Vec<WatchOptions>),
}

impl WatchOptionsSpec {
    pub(crate) fn for_index(&self, idx: usize) -> WatchOptions {
        match self {
            WatchOptionsSpec::Shared(options) => options.clone(),
            WatchOptionsSpec::PerCompiler(list) => list.get(idx).cloned().unwrap_or_default(),
        }
    }
}

impl From<WatchOptions> for WatchOptionsSpec {
    fn from(options: WatchOptions) -> Self {
        WatchOptionsSpec::Shared(options)
    }
}

impl From<Vec<WatchOptions>> for WatchOptionsSpec {
    fn from(list: Vec<WatchOptions>) -> Self {
        WatchOptionsSpec::PerCompiler(list)
    }
}

/// A single orchestratable build unit.
///
/// Implementations are externally owned; the orchestrator holds shared
/// references and never mutates a compiler beyond the file-system
/// injection points below.
pub trait Compiler: Send + Sync {
    /// Unique name within the compiler set.
    fn name(&self) -> &str;

    /// Names of compilers that must build before this one.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Where this compiler writes its output, for aggregate reporting.
    fn output_path(&self) -> PathBuf;

    /// Build once to completion.
    fn run(&self) -> BoxFuture<'_, anyhow::Result<BuildReport>>;

    /// Start the watch loop. Every (re)build outcome, successful or not,
    /// is delivered into `outcomes`. The loop stays alive until the
    /// returned handle is closed.
    fn watch(
        &self,
        options: WatchOptions,
        outcomes: mpsc::Sender<WatchOutcome>,
    ) -> anyhow::Result<Box<dyn Watching>>;

    /// Subscribe to this compiler's lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<CompilerEvent>;

    /// Inject the file system used for reading inputs.
    fn set_input_file_system(&self, fs: Arc<dyn FileSystem>);

    /// Inject the file system used for writing outputs.
    fn set_output_file_system(&self, fs: Arc<dyn FileSystem>);

    /// The currently injected input file system, if any.
    fn input_file_system(&self) -> Option<Arc<dyn FileSystem>>;

    /// The currently injected output file system, if any.
    fn output_file_system(&self) -> Option<Arc<dyn FileSystem>>;
}

/// Handle over a compiler's running watch loop.
pub trait Watching: Send {
    /// Request a rebuild as if an input had changed.
    fn invalidate(&mut self);

    /// Stop the loop. Resolves once the loop has fully shut down.
    fn close(&mut self) -> BoxFuture<'_, anyhow::Result<()>>;
}
