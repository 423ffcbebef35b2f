// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod fs;
pub mod hooks;
pub mod logging;
pub mod multi;
pub mod paths;
pub mod proc;
pub mod report;
pub mod unit;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::load_config;
use crate::config::model::ConfigFile;
use crate::multi::MultiCompiler;
use crate::proc::ProcessCompiler;
use crate::unit::{Compiler, WatchOptions};
use crate::watch::WatchNotification;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the process-backed compilers
/// - the orchestrator facade
/// and then runs once or enters watch mode.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_config(&config_path)?;
    let root = config_root_dir(&config_path);

    let compilers = build_compilers(&cfg, &root)?;
    let multi = MultiCompiler::new(compilers);

    if args.dry_run {
        print_dry_run(&cfg);
        multi.validate_dependencies()?;
        return Ok(());
    }

    if args.watch {
        run_watch(&multi, cfg.watch.clone()).await
    } else {
        let report = multi.run().await?;
        for built in report.reports() {
            info!(
                compiler = %built.compiler,
                duration_ms = built.duration.as_millis() as u64,
                "compiler built"
            );
        }
        info!(output = %multi.output_path().display(), "all compilers built");
        Ok(())
    }
}

async fn run_watch(multi: &MultiCompiler, options: WatchOptions) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<WatchNotification>(16);
    let watching = multi.watch(options, tx)?;

    info!("watching; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down watch session");
                watching.close().await?;
                return Ok(());
            }
            notification = rx.recv() => {
                match notification {
                    Some(WatchNotification::Built(report)) => {
                        let rebuilt: Vec<&str> = report.compiler_names().collect();
                        info!(compilers = ?rebuilt, "aggregate rebuild complete");
                    }
                    Some(WatchNotification::Failed(err)) => {
                        warn!(error = %err, "compiler failed while watching");
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Map `[compiler.<name>]` sections onto process-backed compilers.
fn build_compilers(cfg: &ConfigFile, root: &Path) -> Result<Vec<Arc<dyn Compiler>>> {
    let mut compilers: Vec<Arc<dyn Compiler>> = Vec::with_capacity(cfg.compiler.len());
    for (name, section) in cfg.compiler.iter() {
        let compiler = ProcessCompiler::from_section(name, section, root)
            .with_context(|| format!("configuring compiler '{name}'"))?;
        compilers.push(Arc::new(compiler));
    }
    Ok(compilers)
}

/// Directory containing the config file, or `.`; relative paths in the
/// config resolve against this.
fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Simple dry-run output: print compilers, deps and commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("multic dry-run");
    println!("  watch.debounce_ms = {}", cfg.watch.debounce_ms);
    println!();

    println!("compilers ({}):", cfg.compiler.len());
    for (name, section) in cfg.compiler.iter() {
        println!("  - {name}");
        println!("      cmd: {}", section.cmd);
        if !section.after.is_empty() {
            println!("      after: {:?}", section.after);
        }
        if let Some(ref output) = section.output {
            println!("      output: {}", output.display());
        }
        if !section.watch.is_empty() {
            println!("      watch: {:?}", section.watch);
        }
        if !section.exclude.is_empty() {
            println!("      exclude: {:?}", section.exclude);
        }
    }
}
