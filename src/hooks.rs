// src/hooks.rs

//! Aggregate lifecycle hooks.
//!
//! The facade subscribes to every compiler's event stream at
//! construction time and fans everything into one typed bus that
//! downstream consumers subscribe to. The aggregate `Done` bookkeeping
//! counts each compiler's `Done` once until an `Invalid` takes it back;
//! when the count covers the whole set, one aggregate `Done` carrying
//! every latest report is published.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::report::{BuildReport, MultiReport};
use crate::unit::{Compiler, CompilerEvent};

/// Events published on the aggregate bus.
#[derive(Debug, Clone)]
pub enum MultiEvent {
    /// Every compiler currently has an un-invalidated result.
    Done(MultiReport),
    /// The watch session was closed.
    WatchClose,
    /// Forwarded per-compiler `invalid`.
    Invalid { compiler: String },
    /// Forwarded per-compiler `run`.
    Run { compiler: String },
    /// Forwarded per-compiler `watchRun`.
    WatchRun { compiler: String },
    /// Infrastructure log line; `compiler` is absent for lines written
    /// through the facade's own logger.
    InfrastructureLog {
        compiler: Option<String>,
        logger: String,
        message: String,
    },
}

/// Aggregate hook bus. Cheap to clone; subscribers receive every event
/// published after they subscribe.
#[derive(Debug, Clone)]
pub struct MultiHooks {
    tx: broadcast::Sender<MultiEvent>,
}

impl MultiHooks {
    /// Wire the bus to a compiler set, spawning the fan-in tasks.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn wire(compilers: &[Arc<dyn Compiler>]) -> Self {
        let (tx, _) = broadcast::channel(64);
        let names: Vec<String> = compilers.iter().map(|c| c.name().to_string()).collect();

        let (fan_tx, fan_rx) = mpsc::channel::<(usize, CompilerEvent)>(64);
        for (idx, compiler) in compilers.iter().enumerate() {
            let mut events = compiler.subscribe();
            let fan_tx = fan_tx.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if fan_tx.send((idx, event)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "hook fan-in lagged behind compiler events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        drop(fan_tx);

        tokio::spawn(aggregate_loop(names, fan_rx, tx.clone()));

        Self { tx }
    }

    /// Subscribe to the aggregate event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MultiEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: MultiEvent) {
        // Err just means nobody is subscribed right now.
        let _ = self.tx.send(event);
    }
}

async fn aggregate_loop(
    names: Vec<String>,
    mut fan_rx: mpsc::Receiver<(usize, CompilerEvent)>,
    bus: broadcast::Sender<MultiEvent>,
) {
    let count = names.len();
    let mut done = vec![false; count];
    let mut latest: Vec<Option<BuildReport>> = vec![None; count];
    let mut done_count = 0usize;

    while let Some((idx, event)) = fan_rx.recv().await {
        match event {
            CompilerEvent::Done(report) => {
                if !done[idx] {
                    done[idx] = true;
                    done_count += 1;
                }
                latest[idx] = Some(report);
                if done_count == count {
                    let reports: Vec<BuildReport> = latest.iter().flatten().cloned().collect();
                    let _ = bus.send(MultiEvent::Done(MultiReport::new(reports)));
                }
            }
            CompilerEvent::Invalid => {
                if done[idx] {
                    done[idx] = false;
                    done_count -= 1;
                }
                let _ = bus.send(MultiEvent::Invalid {
                    compiler: names[idx].clone(),
                });
            }
            CompilerEvent::Run => {
                let _ = bus.send(MultiEvent::Run {
                    compiler: names[idx].clone(),
                });
            }
            CompilerEvent::WatchRun => {
                let _ = bus.send(MultiEvent::WatchRun {
                    compiler: names[idx].clone(),
                });
            }
            CompilerEvent::InfrastructureLog { logger, message } => {
                let _ = bus.send(MultiEvent::InfrastructureLog {
                    compiler: Some(names[idx].clone()),
                    logger,
                    message,
                });
            }
        }
    }
}
