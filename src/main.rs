//! CLI entry point for the court monitor.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Command};

/// Process exit outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Some documents were processed and some failed.
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(1),
            ProcessExit::Failure => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let config = commands::load_effective_config(&cli.overrides)?;

    let exit = match cli.command {
        Command::Run { force } => commands::run_cycle_command(config, force).await?,
        Command::Watch => commands::run_watch_command(config).await?,
        Command::Audit => commands::run_audit_command(config)?,
        Command::Report { json } => commands::run_report_command(&config, json)?,
        Command::RetryFailed => commands::run_retry_failed_command(config).await?,
        Command::Reorganize { dry_run } => commands::run_reorganize_command(&config, dry_run)?,
    };

    Ok(exit.into())
}
