//! Moves recorded files into the directory their URL classifies to.
//!
//! Files saved by older layouts (or by hand) keep working as long as the
//! ledger points at them; this pass brings them back under the
//! classifier's tree and rewrites the recorded paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classify::{Category, StorageLayout, classify};
use crate::download::DownloadError;
use crate::download::constants::BACKUP_TIMESTAMP_FORMAT;
use crate::download::filename::{backup_path, disambiguate_path};
use crate::ledger::{LedgerError, LedgerStore, Ledgers};

/// Ledger saves happen after this many moves.
const SAVE_EVERY: usize = 10;

/// One recorded file that is not where its URL classifies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub url: String,
    pub category: Category,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Counts from a reorganization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorganizeSummary {
    pub moved: usize,
    pub already_correct: usize,
    /// Recorded file not on disk; left for the next cycle to re-download.
    pub missing: usize,
    pub failed: usize,
    /// Existing files at a target moved aside first.
    pub backups: usize,
    pub pruned_dirs: usize,
}

/// Lists the moves a reorganization would make, without touching the disk.
///
/// The file name is kept; only the directory changes. A target already
/// recorded for another URL gets a disambiguated name.
#[must_use]
pub fn plan_relocations(ledgers: &Ledgers, layout: &StorageLayout) -> Vec<Relocation> {
    let mut relocations = Vec::new();
    for (url, record) in ledgers.downloaded.iter() {
        let Some(name) = record.path.file_name() else {
            continue;
        };
        let mut to = layout.directory_for(url).join(name);
        if to == record.path {
            continue;
        }
        if ledgers.downloaded.other_owner(&to, url).is_some() {
            to = disambiguate_path(&to, url, layout.max_filename_length());
            if to == record.path {
                continue;
            }
        }
        relocations.push(Relocation {
            url: url.clone(),
            category: classify(url).category,
            from: record.path.clone(),
            to,
        });
    }
    relocations
}

/// Groups `relocations` by category for display.
#[must_use]
pub fn by_category(relocations: &[Relocation]) -> BTreeMap<Category, Vec<&Relocation>> {
    let mut groups: BTreeMap<Category, Vec<&Relocation>> = BTreeMap::new();
    for relocation in relocations {
        groups.entry(relocation.category).or_default().push(relocation);
    }
    groups
}

/// Moves every misplaced recorded file, rewriting the ledger as it goes.
///
/// Holds the state lock. Per-file failures are counted and logged; the
/// ledger is saved every few moves and at the end, then empty directories
/// under the court root are removed.
///
/// # Errors
///
/// Returns [`LedgerError`] when the lock is held or the final save fails.
#[instrument(skip_all, fields(download_dir = %layout.download_dir().display()))]
pub fn reorganize(
    store: &LedgerStore,
    layout: &StorageLayout,
) -> Result<ReorganizeSummary, LedgerError> {
    let _lock = store.lock()?;
    let mut ledgers = store.load();
    let relocations = plan_relocations(&ledgers, layout);
    let mut summary = ReorganizeSummary {
        already_correct: ledgers.downloaded.len() - relocations.len(),
        ..ReorganizeSummary::default()
    };
    info!(total = ledgers.downloaded.len(), misplaced = relocations.len(), "reorganizing");

    for relocation in &relocations {
        if !relocation.from.is_file() {
            warn!(url = %relocation.url, path = %relocation.from.display(), "recorded file not found");
            summary.missing += 1;
            continue;
        }
        match move_into_place(&relocation.from, &relocation.to) {
            Ok(backed_up) => {
                if backed_up {
                    summary.backups += 1;
                }
                ledgers
                    .downloaded
                    .relocate(&relocation.url, relocation.to.clone());
                summary.moved += 1;
                info!(
                    from = %relocation.from.display(),
                    to = %relocation.to.display(),
                    "moved"
                );
                if summary.moved % SAVE_EVERY == 0 {
                    store.save_downloaded(&ledgers.downloaded)?;
                    debug!(moved = summary.moved, "progress saved");
                }
            }
            Err(error) => {
                warn!(url = %relocation.url, error = %error, "cannot move file");
                summary.failed += 1;
            }
        }
    }

    store.save_downloaded(&ledgers.downloaded)?;
    summary.pruned_dirs = prune_empty_dirs(&layout.court_root());
    info!(
        moved = summary.moved,
        already_correct = summary.already_correct,
        missing = summary.missing,
        failed = summary.failed,
        pruned_dirs = summary.pruned_dirs,
        "reorganization complete"
    );
    Ok(summary)
}

/// Moves `from` to `to`, first moving an existing `to` aside.
///
/// Returns true when a backup was made.
fn move_into_place(from: &Path, to: &Path) -> Result<bool, DownloadError> {
    if let Some(dir) = to.parent() {
        std::fs::create_dir_all(dir).map_err(|e| DownloadError::io(dir, e))?;
    }
    let backed_up = if to.exists() {
        let stamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let backup = backup_path(to, &stamp)?;
        std::fs::rename(to, &backup).map_err(|e| DownloadError::io(&backup, e))?;
        info!(backup = %backup.display(), "existing file moved aside");
        true
    } else {
        false
    };
    move_file(from, to)?;
    Ok(backed_up)
}

fn move_file(from: &Path, to: &Path) -> Result<(), DownloadError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems.
    std::fs::copy(from, to).map_err(|e| DownloadError::io(to, e))?;
    std::fs::remove_file(from).map_err(|e| DownloadError::io(from, e))
}

/// Removes empty directories below `root`, deepest first. `root` itself stays.
fn prune_empty_dirs(root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    let mut pruned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        pruned += prune_empty_dirs(&path);
        if std::fs::remove_dir(&path).is_ok() {
            debug!(path = %path.display(), "removed empty directory");
            pruned += 1;
        }
    }
    pruned
}
