//! Read-only summaries over the ledgers and the download tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::classify::{Category, StorageLayout};
use crate::ledger::Ledgers;

/// Files and bytes stored under one category directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub files: usize,
    pub bytes: u64,
    /// `.backup_*` copies, counted separately from `files`.
    pub backups: usize,
}

/// Snapshot of what the monitor knows and what is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub discovered: usize,
    pub downloaded: usize,
    /// Discovered documents not yet downloaded.
    pub pending: usize,
    /// Download records whose file is gone.
    pub missing_on_disk: usize,
    /// Download records per provenance tag.
    pub by_method: BTreeMap<String, usize>,
    /// Disk usage per category directory name.
    pub categories: BTreeMap<String, CategoryUsage>,
    pub first_run_completed: bool,
    pub first_run_completed_at: Option<DateTime<Utc>>,
    pub last_full_scan: Option<DateTime<Utc>>,
}

impl LedgerReport {
    /// Builds the report. Reads the filesystem, never writes.
    #[must_use]
    pub fn build(ledgers: &Ledgers, layout: &StorageLayout) -> Self {
        let pending = ledgers
            .discovered
            .files
            .values()
            .filter(|document| !document.downloaded)
            .count();
        let missing_on_disk = ledgers
            .downloaded
            .iter()
            .filter(|(_, record)| !record.path.is_file())
            .count();

        let mut by_method = BTreeMap::new();
        for (_, record) in ledgers.downloaded.iter() {
            *by_method.entry(record.method.to_string()).or_insert(0) += 1;
        }

        let court_root = layout.court_root();
        let categories = Category::ALL
            .iter()
            .map(|category| {
                let mut usage = CategoryUsage::default();
                tally(&court_root.join(category.dir_name()), &mut usage);
                (category.dir_name().to_string(), usage)
            })
            .collect();

        Self {
            discovered: ledgers.discovered.len(),
            downloaded: ledgers.downloaded.len(),
            pending,
            missing_on_disk,
            by_method,
            categories,
            first_run_completed: ledgers.first_run.completed,
            first_run_completed_at: ledgers.first_run.completed_at,
            last_full_scan: ledgers.discovered.last_full_scan,
        }
    }
}

fn tally(dir: &Path, usage: &mut CategoryUsage) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            debug!(path = %path.display(), "skipping unreadable entry");
            continue;
        };
        if metadata.is_dir() {
            tally(&path, usage);
        } else if entry.file_name().to_string_lossy().contains(".backup_") {
            usage.backups += 1;
        } else {
            usage.files += 1;
            usage.bytes += metadata.len();
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

impl fmt::Display for LedgerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Documents")?;
        writeln!(f, "  discovered:       {}", self.discovered)?;
        writeln!(f, "  downloaded:       {}", self.downloaded)?;
        writeln!(f, "  pending:          {}", self.pending)?;
        writeln!(f, "  missing on disk:  {}", self.missing_on_disk)?;
        if !self.by_method.is_empty() {
            writeln!(f, "Provenance")?;
            for (method, count) in &self.by_method {
                writeln!(f, "  {method:<16}  {count}")?;
            }
        }
        writeln!(f, "Storage")?;
        for (name, usage) in &self.categories {
            writeln!(
                f,
                "  {name:<16}  {} files, {} ({} backups)",
                usage.files,
                human_size(usage.bytes),
                usage.backups
            )?;
        }
        match self.first_run_completed_at {
            Some(at) if self.first_run_completed => {
                writeln!(f, "First run:  completed {}", at.to_rfc3339())?;
            }
            _ if self.first_run_completed => writeln!(f, "First run:  completed")?,
            _ => writeln!(f, "First run:  pending")?,
        }
        match self.last_full_scan {
            Some(at) => write!(f, "Last scan:  {}", at.to_rfc3339()),
            None => write!(f, "Last scan:  never"),
        }
    }
}
