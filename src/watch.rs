// src/watch.rs

//! Continuous (watch-mode) coordination.
//!
//! Startup is dependency-ordered: a compiler's watch loop starts only
//! after every dependency has delivered its first successful build.
//! After startup, rebuilds are free-running; the freshness ledger below
//! decides when a full set of fresh results is available and worth
//! announcing to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

use crate::dag::topo;
use crate::errors::{MulticError, Result};
use crate::hooks::{MultiEvent, MultiHooks};
use crate::report::{BuildReport, MultiReport};
use crate::unit::{Compiler, CompilerEvent, WatchOptions, WatchOptionsSpec, WatchOutcome, Watching};

/// Notification delivered through the caller's watch handler channel.
#[derive(Debug)]
pub enum WatchNotification {
    /// Every compiler is fresh; carries exactly those that rebuilt since
    /// the previous aggregate.
    Built(MultiReport),
    /// A compiler's watch loop reported an error. Sibling loops keep
    /// running.
    Failed(MulticError),
}

/// Per-compiler freshness. `Stale`: no result usable for the next
/// aggregate. `Fresh`: rebuilt since the last aggregate. `Stable`:
/// already aggregated, still counts until invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Stale,
    Fresh,
    Stable,
}

/// Tracks which compilers have produced a result since the last
/// aggregate notification.
#[derive(Debug)]
struct FreshnessLedger {
    states: Vec<Freshness>,
    latest: Vec<Option<BuildReport>>,
}

impl FreshnessLedger {
    fn new(count: usize) -> Self {
        Self {
            states: vec![Freshness::Stale; count],
            latest: vec![None; count],
        }
    }

    /// Record a successful (re)build. Once no compiler is stale, returns
    /// the aggregate of reports that turned fresh since the previous
    /// aggregate and marks the whole set stable.
    fn record_report(&mut self, idx: usize, report: BuildReport) -> Option<MultiReport> {
        self.latest[idx] = Some(report);
        self.states[idx] = Freshness::Fresh;

        if self.states.iter().any(|state| *state == Freshness::Stale) {
            return None;
        }

        let fresh: Vec<BuildReport> = self
            .states
            .iter()
            .zip(&self.latest)
            .filter(|(state, _)| **state == Freshness::Fresh)
            .filter_map(|(_, report)| report.clone())
            .collect();
        for state in &mut self.states {
            *state = Freshness::Stable;
        }
        Some(MultiReport::new(fresh))
    }

    /// An `invalid` notification takes the compiler's result out of
    /// circulation until it rebuilds.
    fn record_invalid(&mut self, idx: usize) {
        self.states[idx] = Freshness::Stale;
    }
}

/// Everything flowing into the watch aggregator: build outcomes from the
/// per-compiler loops, and invalidations from their lifecycle streams.
enum WatchFeed {
    Outcome { idx: usize, outcome: WatchOutcome },
    Invalidated { idx: usize },
}

/// Aggregate handle over every compiler's watch loop.
pub struct MultiWatching {
    handles: Arc<Mutex<Vec<Option<Box<dyn Watching>>>>>,
    running: Arc<AtomicBool>,
    hooks: MultiHooks,
}

impl std::fmt::Debug for MultiWatching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiWatching").finish_non_exhaustive()
    }
}

impl MultiWatching {
    /// Ask every compiler to rebuild, as if all inputs changed.
    pub async fn invalidate(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.iter_mut().flatten() {
            handle.invalidate();
        }
    }

    /// Close every underlying watch loop. Resolves (and fires the
    /// aggregate watch-close hook) only after all of them have shut
    /// down, then releases the session for the next run or watch.
    pub async fn close(self) -> Result<()> {
        let mut first_err: Option<anyhow::Error> = None;
        {
            let mut handles = self.handles.lock().await;
            for slot in handles.iter_mut() {
                if let Some(mut watching) = slot.take() {
                    if let Err(err) = watching.close().await {
                        warn!(error = %err, "watch handle failed to close");
                        first_err.get_or_insert(err);
                    }
                }
            }
        }
        self.running.store(false, Ordering::Release);
        self.hooks.emit(MultiEvent::WatchClose);
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Start the watch session. The caller (the facade) has already checked
/// the concurrency guard, validated the dependency graph, and set the
/// running flag.
pub(crate) fn start(
    compilers: Vec<Arc<dyn Compiler>>,
    options: WatchOptionsSpec,
    handler: mpsc::Sender<WatchNotification>,
    running: Arc<AtomicBool>,
    hooks: MultiHooks,
) -> MultiWatching {
    let count = compilers.len();
    let handles: Arc<Mutex<Vec<Option<Box<dyn Watching>>>>> =
        Arc::new(Mutex::new((0..count).map(|_| None).collect()));

    let (feed_tx, feed_rx) = mpsc::channel::<WatchFeed>(64);

    // Invalidation listeners: demotions flow into the same stream as
    // build outcomes, so the ledger sees them in arrival order.
    for (idx, compiler) in compilers.iter().enumerate() {
        let mut events = compiler.subscribe();
        let feed_tx = feed_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CompilerEvent::Invalid) => {
                        if feed_tx.send(WatchFeed::Invalidated { idx }).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "invalidation listener lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // Aggregator: owns the ledger, announces aggregates, forwards
    // per-compiler errors without stopping anything.
    {
        let names: Vec<String> = compilers.iter().map(|c| c.name().to_string()).collect();
        let handler = handler.clone();
        tokio::spawn(async move {
            let mut feed_rx = feed_rx;
            let mut ledger = FreshnessLedger::new(count);
            while let Some(feed) = feed_rx.recv().await {
                match feed {
                    WatchFeed::Outcome { idx, outcome } => match outcome {
                        Ok(report) => {
                            if let Some(multi) = ledger.record_report(idx, report) {
                                if handler.send(WatchNotification::Built(multi)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(source) => {
                            let err = MulticError::UnitAction {
                                compiler: names[idx].clone(),
                                source,
                            };
                            if handler.send(WatchNotification::Failed(err)).await.is_err() {
                                break;
                            }
                        }
                    },
                    WatchFeed::Invalidated { idx } => ledger.record_invalid(idx),
                }
            }
            debug!("watch aggregator loop ended");
        });
    }

    // Dependency-ordered startup. The per-compiler action completes on
    // the first successful build, which is exactly when dependents may
    // start their own loops.
    {
        let handles = Arc::clone(&handles);
        let startup_compilers = compilers;
        tokio::spawn(async move {
            let startup = topo::run_with_dependencies(&startup_compilers, move |idx, compiler| {
                let handles = Arc::clone(&handles);
                let feed_tx = feed_tx.clone();
                let options = options.for_index(idx);
                Box::pin(start_one(idx, compiler, options, handles, feed_tx))
            })
            .await;
            if let Err(err) = startup {
                warn!(error = %err, "watch startup did not complete");
                let _ = handler.send(WatchNotification::Failed(err)).await;
            }
        });
    }

    MultiWatching {
        handles,
        running,
        hooks,
    }
}

/// Start one compiler's watch loop and pump its outcomes until the first
/// success opens the gate for dependents; the rest of the stream is
/// handed to a background pump.
async fn start_one(
    idx: usize,
    compiler: Arc<dyn Compiler>,
    options: WatchOptions,
    handles: Arc<Mutex<Vec<Option<Box<dyn Watching>>>>>,
    feed_tx: mpsc::Sender<WatchFeed>,
) -> Result<()> {
    let (unit_tx, mut unit_rx) = mpsc::channel::<WatchOutcome>(8);
    let watching = compiler
        .watch(options, unit_tx)
        .map_err(|source| MulticError::UnitAction {
            compiler: compiler.name().to_string(),
            source,
        })?;
    handles.lock().await[idx] = Some(watching);
    debug!(compiler = %compiler.name(), "watch loop started");

    loop {
        match unit_rx.recv().await {
            Some(outcome) => {
                let success = outcome.is_ok();
                if feed_tx.send(WatchFeed::Outcome { idx, outcome }).await.is_err() {
                    // Aggregator is gone; nothing left to coordinate.
                    return Ok(());
                }
                if success {
                    let feed_tx = feed_tx.clone();
                    tokio::spawn(async move {
                        while let Some(outcome) = unit_rx.recv().await {
                            if feed_tx.send(WatchFeed::Outcome { idx, outcome }).await.is_err() {
                                break;
                            }
                        }
                    });
                    return Ok(());
                }
            }
            None => {
                return Err(anyhow!(
                    "watch loop for compiler '{}' ended before its first successful build",
                    compiler.name()
                )
                .into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FreshnessLedger, MultiReport};
    use crate::report::BuildReport;

    fn names(multi: &MultiReport) -> Vec<&str> {
        multi.compiler_names().collect()
    }

    #[test]
    fn aggregate_waits_for_every_compiler() {
        let mut ledger = FreshnessLedger::new(2);
        assert!(ledger.record_report(0, BuildReport::bare("x")).is_none());
        let multi = ledger.record_report(1, BuildReport::bare("y")).unwrap();
        assert_eq!(names(&multi), vec!["x", "y"]);
    }

    #[test]
    fn rebuild_of_one_stable_compiler_aggregates_alone() {
        let mut ledger = FreshnessLedger::new(2);
        ledger.record_report(0, BuildReport::bare("x"));
        ledger.record_report(1, BuildReport::bare("y"));

        // x invalidates and rebuilds; y stays stable and is not re-listed.
        ledger.record_invalid(0);
        let multi = ledger.record_report(0, BuildReport::bare("x")).unwrap();
        assert_eq!(names(&multi), vec!["x"]);
    }

    #[test]
    fn all_invalidated_requires_all_to_rebuild() {
        let mut ledger = FreshnessLedger::new(2);
        ledger.record_report(0, BuildReport::bare("x"));
        ledger.record_report(1, BuildReport::bare("y"));

        ledger.record_invalid(0);
        ledger.record_invalid(1);
        assert!(ledger.record_report(0, BuildReport::bare("x")).is_none());
        let multi = ledger.record_report(1, BuildReport::bare("y")).unwrap();
        assert_eq!(names(&multi), vec!["x", "y"]);
    }

    #[test]
    fn invalidation_during_aggregation_discards_the_pending_result() {
        let mut ledger = FreshnessLedger::new(2);
        ledger.record_report(0, BuildReport::bare("x"));
        // x turns stale again before y ever built; its earlier report
        // must not satisfy the aggregate.
        ledger.record_invalid(0);
        assert!(ledger.record_report(1, BuildReport::bare("y")).is_none());
        let multi = ledger.record_report(0, BuildReport::bare("x")).unwrap();
        assert_eq!(names(&multi), vec!["x", "y"]);
    }

    #[test]
    fn single_compiler_set_aggregates_every_build() {
        let mut ledger = FreshnessLedger::new(1);
        assert!(ledger.record_report(0, BuildReport::bare("x")).is_some());
        ledger.record_invalid(0);
        assert!(ledger.record_report(0, BuildReport::bare("x")).is_some());
    }
}
