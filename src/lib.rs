// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod schedule;
pub mod supervise;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{canonical_source_roots, format_duration, load_optional, ConfigFile};
use crate::engine::{shutdown_signal, EachChange, Rerun};
use crate::errors::DevloopError;
use crate::exec::{CommandExecutor, CommandTemplate, TemplateParam};
use crate::schedule::ExecutionScheduler;
use crate::watch::{ChangeWatcher, KeyResolver};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file + CLI overrides)
/// - the change watcher
/// - the each-change or rerun workflow
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_optional(args.config.as_deref())?;
    args.apply_overrides(&mut raw);
    let cfg = ConfigFile::try_from(raw)?;

    let template = args.command.template()?;
    if matches!(args.command, Command::Rerun { .. }) && template.uses(TemplateParam::Pkg) {
        return Err(DevloopError::TemplateError(
            "{pkg} is not available for rerun; the command is not tied to one package"
                .to_string(),
        )
        .into());
    }

    if args.dry_run {
        print_dry_run(&args.command, &template, &cfg);
        return Ok(());
    }

    let root = canonical_root(&cfg.watch.root)?;
    let source_roots = canonical_source_roots(&cfg.watch.source_roots)?;
    let resolver = cfg.key_resolver(&root, &source_roots);
    log_resolver(&resolver);

    let mut watcher = ChangeWatcher::start(cfg.watch_config(&root), resolver)?;
    let changes = watcher
        .changes()
        .ok_or_else(|| anyhow::anyhow!("change stream already taken"))?;

    let executor = CommandExecutor::new(template);
    info!(command = args.command.name(), cmd = %executor.template(), "devloop started");

    let result = match args.command {
        Command::EachChange { .. } => {
            let scheduler = ExecutionScheduler::new(cfg.schedule.clone());
            EachChange::new(scheduler, executor)
                .run(changes, shutdown_signal())
                .await
        }
        Command::Rerun { .. } => {
            Rerun::new(executor, cfg.supervise.clone())
                .run(changes, shutdown_signal())
                .await
        }
    };

    let closed = watcher.close().await;
    settle(result, closed)?;

    info!("devloop exiting");
    Ok(())
}

/// The workflow's own error wins over a failure to close the watcher.
fn settle(
    result: errors::Result<()>,
    closed: errors::Result<()>,
) -> errors::Result<()> {
    match (result, closed) {
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "failed to close watcher");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), closed) => closed,
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = std::fs::canonicalize(root)
        .map_err(|_| DevloopError::InvalidRoot(root.to_path_buf()))?;
    Ok(canonical)
}

fn log_resolver(resolver: &KeyResolver) {
    match resolver {
        KeyResolver::Relative { root } => debug!(?root, "resolving keys relative to watch root"),
        KeyResolver::SourceRoot {
            roots,
            source_subdir,
        } => debug!(?roots, %source_subdir, "resolving keys below source roots"),
    }
}

/// Simple dry-run output: print the effective configuration and command.
fn print_dry_run(command: &Command, template: &CommandTemplate, cfg: &ConfigFile) {
    println!("devloop dry-run ({})", command.name());
    println!("  command: {template}");
    println!();

    let watch = &cfg.watch;
    println!("[watch]");
    println!("  root = {}", watch.root.display());
    println!("  debounce = {}", format_duration(watch.debounce));
    println!("  exclude = {:?}", watch.exclude);
    println!("  extensions = {:?}", watch.extensions);
    println!("  resolver = {:?}", watch.resolver);
    if !watch.source_roots.is_empty() {
        println!("  source_roots = {:?}", watch.source_roots);
    }
    println!("  source_subdir = {}", watch.source_subdir);

    match command {
        Command::EachChange { .. } => {
            println!("[schedule]");
            println!("  cooldown = {}", format_duration(cfg.schedule.cooldown));
        }
        Command::Rerun { .. } => {
            println!("[supervise]");
            println!("  cooldown = {}", format_duration(cfg.supervise.cooldown));
            println!("  kill_grace = {}", format_duration(cfg.supervise.kill_grace));
        }
    }

    debug!("dry-run complete (no execution)");
}
