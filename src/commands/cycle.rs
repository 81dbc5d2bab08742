//! One-shot cycle commands: `run` and `retry-failed`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use chrono::Local;
use court_monitor::{Config, CycleScope, MonitorCycle, schedule};
use tracing::info;

use crate::ProcessExit;
use crate::commands::{determine_exit_outcome, interrupt_flag, print_summary};

/// Why a scheduled wake-up does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    Open,
    OutsideWorkingHours,
    NotThisTime,
}

/// Applies the working-hours window and the download probability.
///
/// An outstanding first run bypasses the window when
/// `first_run_always_download` is set.
pub(crate) fn gate(monitor: &MonitorCycle) -> Gate {
    let behavior = &monitor.config().human_behavior;
    let first_run = monitor.is_first_run();
    let exempt = first_run && behavior.first_run_always_download;
    if !exempt && !schedule::is_working_time(behavior, Local::now().naive_local()) {
        return Gate::OutsideWorkingHours;
    }
    if schedule::should_download(behavior, first_run, &mut rand::thread_rng()) {
        Gate::Open
    } else {
        Gate::NotThisTime
    }
}

/// Runs a single cycle and prints its summary.
pub(crate) async fn run_gated_cycle(
    monitor: &MonitorCycle,
    force: bool,
    interrupted: &Arc<AtomicBool>,
) -> Result<ProcessExit> {
    if !force {
        match gate(monitor) {
            Gate::Open => {}
            Gate::OutsideWorkingHours => {
                info!("outside working hours, not downloading (use --force to override)");
                return Ok(ProcessExit::Success);
            }
            Gate::NotThisTime => {
                info!("skipping downloads this time");
                return Ok(ProcessExit::Success);
            }
        }
    }

    let mut options = monitor.default_options();
    options.interrupted = Arc::clone(interrupted);
    if !force {
        options.session_budget = Some(schedule::session_budget(
            &monitor.config().human_behavior,
            &mut rand::thread_rng(),
        ));
    }
    let summary = monitor.run(&options).await?;
    print_summary(&summary);
    Ok(determine_exit_outcome(&summary))
}

pub async fn run_cycle_command(config: Config, force: bool) -> Result<ProcessExit> {
    let monitor = MonitorCycle::from_config(config)?;
    run_gated_cycle(&monitor, force, &interrupt_flag()).await
}

pub async fn run_retry_failed_command(config: Config) -> Result<ProcessExit> {
    let monitor = MonitorCycle::from_config(config)?;
    let mut options = monitor.default_options();
    options.scope = CycleScope::PendingOnly;
    options.change_detection = false;
    options.interrupted = interrupt_flag();

    let summary = monitor.run(&options).await?;
    print_summary(&summary);
    Ok(determine_exit_outcome(&summary))
}
