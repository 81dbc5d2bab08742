//! CLI command handlers.

mod cycle;
mod inspect;
mod reorganize;
mod watch;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use court_monitor::{Config, CycleSummary};
use tracing::info;

use crate::ProcessExit;
use crate::cli::ConfigOverrides;

pub use cycle::{run_cycle_command, run_retry_failed_command};
pub use inspect::{run_audit_command, run_report_command};
pub use reorganize::run_reorganize_command;
pub use watch::run_watch_command;

/// Loads the configuration file and applies command-line overrides.
pub fn load_effective_config(overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = Config::load(&overrides.config)
        .with_context(|| format!("cannot load {}", overrides.config.display()))?;
    if let Some(dir) = &overrides.download_dir {
        config.download_dir.clone_from(dir);
    }
    if let Some(dir) = &overrides.state_dir {
        config.state_dir.clone_from(dir);
    }
    if let Some(max_retries) = overrides.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(fetch_mode) = overrides.fetch_mode {
        config.fetch_mode = fetch_mode;
    }
    config.validate()?;
    Ok(config)
}

/// Maps a cycle summary to the process exit outcome.
pub(crate) fn determine_exit_outcome(summary: &CycleSummary) -> ProcessExit {
    let completed = summary.new + summary.updated + summary.unchanged;
    let failed = summary.failed + summary.crawl_failures;
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

pub(crate) fn print_summary(summary: &CycleSummary) {
    println!(
        "{:?} cycle: {} discovered, {} new, {} updated, {} unchanged, {} failed, {} backfilled, {} deferred",
        summary.mode,
        summary.discovered,
        summary.new,
        summary.updated,
        summary.unchanged,
        summary.failed,
        summary.backfilled,
        summary.deferred,
    );
    if summary.crawl_failures > 0 {
        println!("{} listing page(s) could not be crawled", summary.crawl_failures);
    }
    if summary.interrupted {
        println!("Interrupted; unfinished work is left for the next cycle.");
    }
    if summary.first_run_completed {
        println!("First run completed.");
    }
}

/// Flag set once Ctrl-C is received.
pub(crate) fn interrupt_flag() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current document");
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    interrupted
}
