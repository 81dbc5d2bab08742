//! `watch`: run cycles forever until interrupted.

use std::sync::atomic::Ordering;

use anyhow::Result;
use court_monitor::{Config, MonitorCycle, schedule};
use tracing::{info, warn};

use crate::ProcessExit;
use crate::commands::cycle::run_gated_cycle;
use crate::commands::interrupt_flag;

pub async fn run_watch_command(config: Config) -> Result<ProcessExit> {
    let monitor = MonitorCycle::from_config(config)?;
    let interval = monitor.config().check_interval_minutes;
    let variation = monitor.config().human_behavior.interval_variation;
    info!(interval_minutes = interval, "watching for new documents");
    let interrupted = interrupt_flag();

    loop {
        match run_gated_cycle(&monitor, false, &interrupted).await {
            Ok(exit) if exit != ProcessExit::Success => {
                warn!(?exit, "cycle finished with failures, retrying next time");
            }
            Ok(_) => {}
            Err(error) => warn!(error = %format!("{error:#}"), "cycle aborted"),
        }

        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted, stopping");
            return Ok(ProcessExit::Success);
        }

        let delay = schedule::next_check_delay(interval, variation, &mut rand::thread_rng());
        info!(next_check_secs = delay.as_secs(), "sleeping until next check");
        if !schedule::sleep_unless_interrupted(delay, &interrupted).await {
            info!("interrupted, stopping");
            return Ok(ProcessExit::Success);
        }
    }
}
