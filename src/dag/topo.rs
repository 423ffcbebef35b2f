// src/dag/topo.rs

//! Dependency-ordered concurrent execution.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::Result;
use crate::unit::{BoxFuture, Compiler};

/// Run `action` once per compiler, in waves: every compiler whose
/// dependencies have all completed successfully is dispatched
/// concurrently, and each completion releases newly-unblocked compilers.
///
/// The first action error is returned immediately; in-flight sibling
/// actions are left to finish on their own and their results are
/// ignored. Callers must have validated the dependency graph first: a
/// wave with nothing ready while compilers remain means the graph was
/// not actually acyclic and is reported as an internal error.
pub(crate) async fn run_with_dependencies<A>(
    compilers: &[Arc<dyn Compiler>],
    action: A,
) -> Result<()>
where
    A: Fn(usize, Arc<dyn Compiler>) -> BoxFuture<'static, Result<()>>,
{
    let mut fulfilled: HashSet<String> = HashSet::new();
    let mut remaining: Vec<(usize, Arc<dyn Compiler>)> =
        compilers.iter().cloned().enumerate().collect();

    let (done_tx, mut done_rx) = mpsc::channel::<(String, Result<()>)>(compilers.len().max(1));

    let mut in_flight = 0usize;
    dispatch_ready(&mut remaining, &fulfilled, &action, &done_tx, &mut in_flight);
    if in_flight == 0 && !remaining.is_empty() {
        return Err(anyhow!("dependency graph deadlock: no compiler is ready to run").into());
    }

    while in_flight > 0 {
        let Some((name, result)) = done_rx.recv().await else {
            return Err(anyhow!("executor completion channel closed unexpectedly").into());
        };
        in_flight -= 1;
        result?;
        fulfilled.insert(name);

        dispatch_ready(&mut remaining, &fulfilled, &action, &done_tx, &mut in_flight);
        if in_flight == 0 && !remaining.is_empty() {
            return Err(anyhow!("dependency graph deadlock: no compiler is ready to run").into());
        }
    }

    Ok(())
}

/// Move every ready compiler out of `remaining` and spawn its action.
fn dispatch_ready<A>(
    remaining: &mut Vec<(usize, Arc<dyn Compiler>)>,
    fulfilled: &HashSet<String>,
    action: &A,
    done_tx: &mpsc::Sender<(String, Result<()>)>,
    in_flight: &mut usize,
) where
    A: Fn(usize, Arc<dyn Compiler>) -> BoxFuture<'static, Result<()>>,
{
    let list = std::mem::take(remaining);
    for (idx, compiler) in list {
        let ready = compiler
            .dependencies()
            .iter()
            .all(|dep| fulfilled.contains(dep));
        if !ready {
            remaining.push((idx, compiler));
            continue;
        }

        debug!(compiler = %compiler.name(), "dependencies fulfilled; dispatching");
        let name = compiler.name().to_string();
        let fut = action(idx, compiler);
        let done_tx = done_tx.clone();
        *in_flight += 1;
        tokio::spawn(async move {
            let result = fut.await;
            // Err here means the coordinator already gave up on this pass.
            let _ = done_tx.send((name, result)).await;
        });
    }
}
