//! `reorganize`: move recorded files under the classified layout.

use anyhow::Result;
use court_monitor::reorganize::by_category;
use court_monitor::{Config, LedgerStore, StorageLayout, plan_relocations, reorganize};

use crate::ProcessExit;

/// Names listed per category in a dry run.
const PREVIEW_PER_CATEGORY: usize = 5;

pub fn run_reorganize_command(config: &Config, dry_run: bool) -> Result<ProcessExit> {
    let store = LedgerStore::new(&config.state_dir);
    let layout = StorageLayout::new(&config.download_dir, config.max_filename_length);

    if dry_run {
        let relocations = plan_relocations(&store.load(), &layout);
        if relocations.is_empty() {
            println!("Every recorded file is already in place.");
            return Ok(ProcessExit::Success);
        }
        println!("{} file(s) would move:", relocations.len());
        for (category, moves) in by_category(&relocations) {
            println!("  {category}: {}", moves.len());
            for relocation in moves.iter().take(PREVIEW_PER_CATEGORY) {
                println!("    {} -> {}", relocation.from.display(), relocation.to.display());
            }
            if moves.len() > PREVIEW_PER_CATEGORY {
                println!("    ... and {} more", moves.len() - PREVIEW_PER_CATEGORY);
            }
        }
        return Ok(ProcessExit::Success);
    }

    let summary = reorganize(&store, &layout)?;
    println!(
        "Moved {} file(s); {} already in place, {} missing, {} failed, {} empty folder(s) removed.",
        summary.moved,
        summary.already_correct,
        summary.missing,
        summary.failed,
        summary.pruned_dirs,
    );
    Ok(if summary.failed == 0 {
        ProcessExit::Success
    } else if summary.moved > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    })
}
