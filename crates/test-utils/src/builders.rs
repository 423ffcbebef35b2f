#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fake_compiler::FakeCompiler;

/// Shared, ordered log of compiler activity: `start:<name>`,
/// `done:<name>`, `fail:<name>`, `watch:<name>`.
pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn new_run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Builder for [`FakeCompiler`] to simplify test setup.
pub struct FakeCompilerBuilder {
    name: String,
    dependencies: Vec<String>,
    output_path: PathBuf,
    delay: Duration,
    fail: bool,
    log: RunLog,
}

impl FakeCompilerBuilder {
    /// All fakes in one test usually share a run log so ordering across
    /// compilers can be asserted.
    pub fn new(name: &str, log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            output_path: PathBuf::from(format!("/build/{name}")),
            delay: Duration::ZERO,
            fail: false,
            log: Arc::clone(log),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.dependencies.push(dep.to_string());
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn fails(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.output_path = PathBuf::from(path);
        self
    }

    pub fn build(self) -> Arc<FakeCompiler> {
        Arc::new(FakeCompiler::new(
            self.name,
            self.dependencies,
            self.output_path,
            self.delay,
            self.fail,
            self.log,
        ))
    }
}
