//! Dispositions, actions and the resulting plan.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::ledger::Ledgers;

/// How a URL's ledger state relates to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// No file on disk and no download record.
    MissingCompletely,
    /// A download record exists but its file is gone.
    MissingOnDisk,
    /// A file is on disk but the ledgers do not say so (or point elsewhere).
    OutdatedRecord,
    /// File, download record and `downloaded` flag agree.
    CorrectlyTracked,
}

impl Disposition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCompletely => "missing_completely",
            Self::MissingOnDisk => "missing_on_disk",
            Self::OutdatedRecord => "outdated_record",
            Self::CorrectlyTracked => "correctly_tracked",
        }
    }

    /// All dispositions, in report order.
    pub const ALL: [Disposition; 4] = [
        Self::MissingCompletely,
        Self::MissingOnDisk,
        Self::OutdatedRecord,
        Self::CorrectlyTracked,
    ];
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor should do with a URL this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Skip,
    DownloadNew,
    RedownloadMissing,
    /// Fetch and compare hashes; replace with a backup when different.
    RedownloadChanged,
    /// The ledger was corrected from the file on disk; nothing to fetch.
    FixRecordOnly,
}

impl Action {
    /// True when the action needs a network fetch.
    #[must_use]
    pub fn needs_fetch(self) -> bool {
        matches!(
            self,
            Self::DownloadNew | Self::RedownloadMissing | Self::RedownloadChanged
        )
    }
}

/// Whether the cycle runs in first-run or monitoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// No completed cycle yet: every discovered document is fetched.
    FirstRun,
    /// Only new, missing and (optionally) changed documents are fetched.
    Monitoring,
}

impl RunMode {
    #[must_use]
    pub fn from_ledgers(ledgers: &Ledgers) -> Self {
        if ledgers.is_first_run() {
            Self::FirstRun
        } else {
            Self::Monitoring
        }
    }
}

/// The decision for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub url: String,
    pub disposition: Disposition,
    pub action: Action,
    /// Where the file is, or where it should be written.
    pub target: PathBuf,
    /// Listed by this cycle's crawl (false for ledger-only URLs).
    pub in_crawl: bool,
    /// The ledgers were corrected from the file on disk during planning.
    pub backfilled: bool,
}

/// One entry per URL in the union of the crawl and both ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    pub entries: Vec<PlanEntry>,
}

impl ActionPlan {
    /// Entries that need a fetch, in plan order.
    pub fn downloads(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|entry| entry.action.needs_fetch())
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|entry| entry.url == url)
    }

    #[must_use]
    pub fn count(&self, disposition: Disposition) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.disposition == disposition)
            .count()
    }

    #[must_use]
    pub fn count_action(&self, action: Action) -> usize {
        self.entries.iter().filter(|entry| entry.action == action).count()
    }

    #[must_use]
    pub fn backfilled(&self) -> usize {
        self.entries.iter().filter(|entry| entry.backfilled).count()
    }

    /// Count per disposition, including zeroes.
    #[must_use]
    pub fn disposition_counts(&self) -> BTreeMap<Disposition, usize> {
        Disposition::ALL
            .iter()
            .map(|disposition| (*disposition, self.count(*disposition)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
