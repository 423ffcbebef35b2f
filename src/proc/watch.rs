// src/proc/watch.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::proc::patterns::ChangePatterns;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping this stops
/// file watching.
pub struct ChangeWatcher {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher").finish()
    }
}

/// Watch `root` recursively and send one unit signal per filesystem
/// event whose path matches `patterns`.
pub fn spawn_change_watcher(
    root: impl Into<PathBuf>,
    patterns: ChangePatterns,
    trigger_tx: mpsc::Sender<()>,
) -> Result<ChangeWatcher> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or_else(|_| root.clone()); // best-effort

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // tracing isn't safe to assume inside the notify
                    // callback thread; fall back to stderr.
                    eprintln!("multic: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("multic: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    debug!(root = ?root, "change watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            for path in &event.paths {
                let Some(rel) = relative_str(&root, path) else {
                    continue;
                };
                if patterns.matches(&rel) {
                    debug!(path = %rel, "change matched watch patterns");
                    if trigger_tx.send(()).await.is_err() {
                        return;
                    }
                    // One trigger per event is enough.
                    break;
                }
            }
        }
        debug!("change watcher loop ended");
    });

    Ok(ChangeWatcher { _inner: watcher })
}

/// Path relative to `root`, with forward slashes.
fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}
