//! Network-free commands: `audit` and `report`.

use anyhow::{Context, Result};
use court_monitor::{
    Action, Config, Disposition, LedgerReport, LedgerStore, MonitorCycle, StorageLayout,
};

use crate::ProcessExit;

pub fn run_audit_command(config: Config) -> Result<ProcessExit> {
    let monitor = MonitorCycle::from_config(config)?;
    let plan = monitor.audit()?;

    println!("Audited {} ledger entries.", plan.len());
    for disposition in Disposition::ALL {
        println!("  {:<20}  {}", disposition.as_str(), plan.count(disposition));
    }
    println!("Backfilled {} record(s) from files on disk.", plan.backfilled());
    let pending =
        plan.count_action(Action::DownloadNew) + plan.count_action(Action::RedownloadMissing);
    if pending > 0 {
        println!("{pending} document(s) need downloading; run `court-monitor retry-failed`.");
    }
    Ok(ProcessExit::Success)
}

pub fn run_report_command(config: &Config, json: bool) -> Result<ProcessExit> {
    let ledgers = LedgerStore::new(&config.state_dir).load();
    let layout = StorageLayout::new(&config.download_dir, config.max_filename_length);
    let report = LedgerReport::build(&ledgers, &layout);

    if json {
        let rendered = serde_json::to_string_pretty(&report).context("cannot render report")?;
        println!("{rendered}");
    } else {
        println!("{report}");
    }
    Ok(ProcessExit::Success)
}
