// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::RawConfigFile;
use crate::errors::Result;
use crate::exec::CommandTemplate;
use crate::types::ResolverKind;

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Run commands when source packages change.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file (TOML).
    ///
    /// Default: `Devloop.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory to watch (overrides `[watch].root`).
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Quiet period before changed packages are reported, e.g. "500ms".
    #[arg(long, global = true, value_name = "DURATION")]
    pub debounce: Option<String>,

    /// Cooldown of the selected workflow, e.g. "4s".
    ///
    /// Applies to `[schedule]` for `each-change` and to `[supervise]` for
    /// `rerun`.
    #[arg(long, global = true, value_name = "DURATION")]
    pub cooldown: Option<String>,

    /// How changed directories map to package keys.
    #[arg(long, global = true, value_name = "relative|source-root")]
    pub resolver: Option<ResolverKind>,

    /// Source root for the `source-root` resolver. Repeatable.
    #[arg(long = "source-root", global = true, value_name = "DIR")]
    pub source_roots: Vec<PathBuf>,

    /// Source file extension to react to. Repeatable.
    #[arg(long = "ext", global = true, value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the effective configuration, but don't watch
    /// or execute anything.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a command for every changed package; `{pkg}` is replaced by the
    /// package key.
    EachChange {
        /// Run this shell command line instead of an argv command.
        #[arg(long, value_name = "STRING", conflicts_with = "cmd")]
        shell: Option<String>,

        /// Command and arguments, after `--`.
        #[arg(last = true, value_name = "CMD", required_unless_present = "shell")]
        cmd: Vec<String>,
    },

    /// Keep a command running and restart it whenever anything changes.
    Rerun {
        /// Run this shell command line instead of an argv command.
        #[arg(long, value_name = "STRING", conflicts_with = "cmd")]
        shell: Option<String>,

        /// Command and arguments, after `--`.
        #[arg(last = true, value_name = "CMD", required_unless_present = "shell")]
        cmd: Vec<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::EachChange { .. } => "each-change",
            Command::Rerun { .. } => "rerun",
        }
    }

    /// Parse the command template given on the command line.
    pub fn template(&self) -> Result<CommandTemplate> {
        let (shell, cmd) = match self {
            Command::EachChange { shell, cmd } | Command::Rerun { shell, cmd } => (shell, cmd),
        };
        match shell {
            Some(line) => CommandTemplate::shell(line),
            None => CommandTemplate::from_argv(cmd.as_slice()),
        }
    }
}

impl CliArgs {
    /// Apply command-line overrides on top of the file configuration.
    ///
    /// Overrides go into the raw model so they pass the same validation as
    /// file values.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(root) = &self.root {
            raw.watch.root = Some(root.clone());
        }
        if let Some(debounce) = &self.debounce {
            raw.watch.debounce = debounce.clone();
        }
        if let Some(cooldown) = &self.cooldown {
            match self.command {
                Command::EachChange { .. } => raw.schedule.cooldown = cooldown.clone(),
                Command::Rerun { .. } => raw.supervise.cooldown = cooldown.clone(),
            }
        }
        if let Some(resolver) = self.resolver {
            raw.watch.resolver = resolver;
        }
        if !self.source_roots.is_empty() {
            raw.watch.source_roots = self.source_roots.clone();
        }
        if !self.extensions.is_empty() {
            raw.watch.extensions = self.extensions.clone();
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
