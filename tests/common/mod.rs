#![allow(dead_code)]

use std::sync::Arc;

use multic::unit::Compiler;
use multic_test_utils::FakeCompiler;

pub use multic_test_utils::init_tracing;

/// Upcast fake compilers into the trait objects the facade consumes,
/// keeping the originals around for scripting and assertions.
pub fn as_compilers(fakes: &[&Arc<FakeCompiler>]) -> Vec<Arc<dyn Compiler>> {
    fakes
        .iter()
        .map(|fake| Arc::clone(fake) as Arc<dyn Compiler>)
        .collect()
}
