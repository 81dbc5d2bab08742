//! The reconciliation engine.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::oracle::{FileOracle, FsOracle};
use super::plan::{Action, ActionPlan, Disposition, PlanEntry, RunMode};
use crate::classify::StorageLayout;
use crate::ledger::{DownloadMethod, DownloadRecord, Ledgers};

/// Disposition of a single URL before any action is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub disposition: Disposition,
    /// File found on disk: the recorded path first, then the predicted one.
    pub on_disk: Option<PathBuf>,
    /// Where a fetch should write.
    pub target: PathBuf,
}

/// Converges a crawl, both ledgers and the filesystem into an [`ActionPlan`].
#[derive(Debug, Clone)]
pub struct Reconciler<O = FsOracle> {
    layout: StorageLayout,
    oracle: O,
    change_detection: bool,
}

impl Reconciler<FsOracle> {
    #[must_use]
    pub fn new(layout: StorageLayout) -> Self {
        Self::with_oracle(layout, FsOracle)
    }
}

impl<O: FileOracle> Reconciler<O> {
    #[must_use]
    pub fn with_oracle(layout: StorageLayout, oracle: O) -> Self {
        Self {
            layout,
            oracle,
            change_detection: false,
        }
    }

    /// In monitoring mode, also re-fetch tracked documents to compare hashes.
    #[must_use]
    pub fn with_change_detection(mut self, enabled: bool) -> Self {
        self.change_detection = enabled;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Records the crawl in the discovered ledger, then plans every known URL.
    ///
    /// Outdated records are backfilled from disk before the plan is returned.
    #[instrument(skip(self, discovered, ledgers), fields(discovered = discovered.len(), mode = ?mode))]
    pub fn reconcile(
        &self,
        discovered: &[String],
        ledgers: &mut Ledgers,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> ActionPlan {
        let added = ledgers.observe(discovered, now);
        debug!(added, "crawl observed");
        self.plan(discovered, ledgers, mode, now)
    }

    /// Plans every ledger URL without a crawl, in monitoring mode.
    ///
    /// Backfills outdated records; needs no network.
    #[instrument(skip(self, ledgers))]
    pub fn audit(&self, ledgers: &mut Ledgers, now: DateTime<Utc>) -> ActionPlan {
        self.plan(&[], ledgers, RunMode::Monitoring, now)
    }

    fn plan(
        &self,
        discovered: &[String],
        ledgers: &mut Ledgers,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> ActionPlan {
        let crawled: HashSet<&str> = discovered.iter().map(String::as_str).collect();

        let mut ordered: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for url in discovered {
            if seen.insert(url.clone()) {
                ordered.push(url.clone());
            }
        }
        for url in ledgers.known_urls() {
            if seen.insert(url.clone()) {
                ordered.push(url);
            }
        }

        let mut owners = ledgers.downloaded.path_owners();
        let mut plan = ActionPlan::default();
        for url in ordered {
            let in_crawl = crawled.contains(url.as_str());
            let mut assessment = self.assess_with_owners(&url, ledgers, &owners);

            let mut backfilled = false;
            if assessment.disposition == Disposition::OutdatedRecord {
                backfilled = self.backfill(&url, &assessment, ledgers, now);
                if backfilled && let Some(path) = &assessment.on_disk {
                    owners.entry(path.clone()).or_insert_with(|| url.clone());
                }
                if !backfilled {
                    assessment.disposition = if ledgers.downloaded.get(&url).is_some() {
                        Disposition::MissingOnDisk
                    } else {
                        Disposition::MissingCompletely
                    };
                }
            }

            let action = self.choose_action(assessment.disposition, in_crawl, mode);
            debug!(url = %url, disposition = %assessment.disposition, action = ?action, "planned");
            plan.entries.push(PlanEntry {
                url,
                disposition: assessment.disposition,
                action,
                target: assessment.target,
                in_crawl,
                backfilled,
            });
        }

        info!(
            total = plan.len(),
            missing_completely = plan.count(Disposition::MissingCompletely),
            missing_on_disk = plan.count(Disposition::MissingOnDisk),
            outdated_record = plan.count(Disposition::OutdatedRecord),
            correctly_tracked = plan.count(Disposition::CorrectlyTracked),
            downloads = plan.downloads().count(),
            "reconciliation complete"
        );
        plan
    }

    /// Classifies one URL against the ledgers and the disk. Pure.
    ///
    /// A predicted path recorded for another URL is never taken as this
    /// URL's file; the URL gets a disambiguated path instead.
    #[must_use]
    pub fn assess(&self, url: &str, ledgers: &Ledgers) -> Assessment {
        self.assess_with_owners(url, ledgers, &ledgers.downloaded.path_owners())
    }

    fn assess_with_owners(
        &self,
        url: &str,
        ledgers: &Ledgers,
        owners: &HashMap<PathBuf, String>,
    ) -> Assessment {
        let record = ledgers.downloaded.get(url);
        let mut predicted = self.layout.predicted_path(url);
        if let Some(owner) = owners.get(&predicted).filter(|owner| owner.as_str() != url) {
            let alternative = self.layout.disambiguated_path(url);
            debug!(
                url = %url,
                owner = %owner,
                path = %alternative.display(),
                "predicted path belongs to another document"
            );
            predicted = alternative;
        }

        let on_disk = record
            .map(|r| r.path.clone())
            .filter(|path| self.oracle.exists(path))
            .or_else(|| self.oracle.exists(&predicted).then(|| predicted.clone()));

        let target = on_disk
            .clone()
            .or_else(|| record.map(|r| r.path.clone()))
            .unwrap_or(predicted);

        let disposition = match (&on_disk, record) {
            (None, None) => Disposition::MissingCompletely,
            (None, Some(_)) => Disposition::MissingOnDisk,
            (Some(path), Some(record))
                if record.path == *path && is_flagged_downloaded(url, ledgers) =>
            {
                Disposition::CorrectlyTracked
            }
            (Some(_), _) => Disposition::OutdatedRecord,
        };

        Assessment {
            disposition,
            on_disk,
            target,
        }
    }

    fn choose_action(&self, disposition: Disposition, in_crawl: bool, mode: RunMode) -> Action {
        match (mode, disposition) {
            (_, Disposition::MissingCompletely) => Action::DownloadNew,
            (_, Disposition::MissingOnDisk) => Action::RedownloadMissing,
            (RunMode::FirstRun, Disposition::OutdatedRecord | Disposition::CorrectlyTracked)
                if in_crawl =>
            {
                Action::RedownloadChanged
            }
            (_, Disposition::OutdatedRecord) => Action::FixRecordOnly,
            (RunMode::Monitoring, Disposition::CorrectlyTracked)
                if in_crawl && self.change_detection =>
            {
                Action::RedownloadChanged
            }
            (_, Disposition::CorrectlyTracked) => Action::Skip,
        }
    }

    /// Hashes the file on disk and records it with method `record_fixed`.
    ///
    /// Local bytes win over any previously recorded hash.
    fn backfill(
        &self,
        url: &str,
        assessment: &Assessment,
        ledgers: &mut Ledgers,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(path) = assessment.on_disk.as_ref() else {
            return false;
        };
        match self.oracle.fingerprint(path) {
            Ok((hash, size)) => {
                info!(url = %url, path = %path.display(), "ledger corrected from file on disk");
                ledgers.record_download(
                    url,
                    DownloadRecord {
                        hash,
                        path: path.clone(),
                        downloaded_at: now,
                        size,
                        method: DownloadMethod::RecordFixed,
                    },
                );
                true
            }
            Err(error) => {
                warn!(url = %url, path = %path.display(), error = %error, "cannot read file for backfill");
                false
            }
        }
    }
}

fn is_flagged_downloaded(url: &str, ledgers: &Ledgers) -> bool {
    ledgers
        .discovered
        .get(url)
        .is_some_and(|document| document.downloaded)
}
