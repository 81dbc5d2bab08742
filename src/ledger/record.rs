//! Ledger record types and their in-memory mutations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Provenance of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMethod {
    /// Plain HTTP fetch.
    Basic,
    /// Browser-session fetch.
    Browser,
    /// Ledger corrected from a file already on disk, nothing was fetched.
    RecordFixed,
}

impl std::fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Basic => "basic",
            Self::Browser => "browser",
            Self::RecordFixed => "record_fixed",
        };
        f.write_str(tag)
    }
}

/// One discovered document, keyed by URL in [`DiscoveredLedger::files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// First time the URL appeared in a crawl. Never changes.
    pub first_seen: DateTime<Utc>,
    /// Most recent crawl that listed the URL.
    pub last_seen: DateTime<Utc>,
    /// A successful save is on record.
    #[serde(default)]
    pub downloaded: bool,
    /// Discovered but not yet confirmed downloaded.
    #[serde(default)]
    pub is_new: bool,
    /// Last confirmed save or backfill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_downloaded: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Record for a URL observed for the first time at `now`.
    #[must_use]
    pub fn first_seen_at(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            downloaded: false,
            is_new: true,
            last_downloaded: None,
        }
    }
}

/// Every URL ever discovered, plus the time of the last full crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLedger {
    #[serde(default)]
    pub files: BTreeMap<String, DocumentRecord>,
    #[serde(default)]
    pub last_full_scan: Option<DateTime<Utc>>,
}

impl DiscoveredLedger {
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&DocumentRecord> {
        self.files.get(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where and what was last saved for a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// SHA-256 hex digest of the saved bytes.
    pub hash: String,
    /// Path the bytes were written to.
    pub path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
    pub size: u64,
    pub method: DownloadMethod,
}

/// URL to [`DownloadRecord`]; serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadedLedger {
    entries: BTreeMap<String, DownloadRecord>,
}

impl DownloadedLedger {
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&DownloadRecord> {
        self.entries.get(url)
    }

    /// Inserts or replaces the record for `url`.
    pub fn insert(&mut self, url: impl Into<String>, record: DownloadRecord) {
        self.entries.insert(url.into(), record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DownloadRecord)> {
        self.entries.iter()
    }

    /// URL other than `url` whose record points at `path`.
    #[must_use]
    pub fn other_owner(&self, path: &Path, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(owner, record)| owner.as_str() != url && record.path == path)
            .map(|(owner, _)| owner.as_str())
    }

    /// Points the record for `url` at `path`. Returns false when there is no record.
    pub fn relocate(&mut self, url: &str, path: PathBuf) -> bool {
        match self.entries.get_mut(url) {
            Some(record) => {
                record.path = path;
                true
            }
            None => false,
        }
    }

    /// Recorded path to the URL that owns it.
    #[must_use]
    pub fn path_owners(&self) -> HashMap<PathBuf, String> {
        let mut owners = HashMap::with_capacity(self.entries.len());
        for (url, record) in &self.entries {
            owners
                .entry(record.path.clone())
                .or_insert_with(|| url.clone());
        }
        owners
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

/// Persisted marker that the first full cycle has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstRunMarker {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The three persisted sources of truth, owned by one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledgers {
    pub discovered: DiscoveredLedger,
    pub downloaded: DownloadedLedger,
    pub first_run: FirstRunMarker,
}

impl Ledgers {
    /// True until a full cycle has completed.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        !self.first_run.completed
    }

    pub fn mark_first_run_completed(&mut self, now: DateTime<Utc>) {
        self.first_run = FirstRunMarker {
            completed: true,
            completed_at: Some(now),
        };
    }

    /// Merges the URLs of a fresh crawl into the discovered ledger.
    ///
    /// Unknown URLs get a new record with `is_new`. Known URLs get `last_seen`
    /// bumped and, while still not downloaded, `is_new` set again.
    /// Returns the number of URLs seen for the first time.
    pub fn observe(&mut self, urls: &[String], now: DateTime<Utc>) -> usize {
        let mut added = 0;
        for url in urls {
            match self.discovered.files.get_mut(url) {
                Some(record) => {
                    record.last_seen = now;
                    if !record.downloaded {
                        record.is_new = true;
                    }
                }
                None => {
                    info!(url = %url, "new document discovered");
                    self.discovered
                        .files
                        .insert(url.clone(), DocumentRecord::first_seen_at(now));
                    added += 1;
                }
            }
        }
        self.discovered.last_full_scan = Some(now);
        added
    }

    /// Stores a confirmed save (or backfill) and marks the document downloaded.
    pub fn record_download(&mut self, url: &str, record: DownloadRecord) {
        let at = record.downloaded_at;
        debug!(url = %url, method = %record.method, path = %record.path.display(), "recording download");
        self.downloaded.insert(url, record);
        self.mark_confirmed(url, at);
        if let Some(document) = self.discovered.files.get_mut(url) {
            document.last_downloaded = Some(at);
        }
    }

    /// Marks the document downloaded without touching its download record.
    pub fn mark_confirmed(&mut self, url: &str, now: DateTime<Utc>) {
        let document = self
            .discovered
            .files
            .entry(url.to_string())
            .or_insert_with(|| DocumentRecord::first_seen_at(now));
        document.downloaded = true;
        document.is_new = false;
    }

    /// Union of every URL known to either ledger, in sorted order.
    #[must_use]
    pub fn known_urls(&self) -> BTreeSet<String> {
        self.discovered
            .files
            .keys()
            .chain(self.downloaded.entries.keys())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn record(path: &str) -> DownloadRecord {
        DownloadRecord {
            hash: "abc".to_string(),
            path: PathBuf::from(path),
            downloaded_at: at(12),
            size: 2048,
            method: DownloadMethod::Basic,
        }
    }

    #[test]
    fn test_other_owner_ignores_the_asking_url() {
        let mut ledgers = Ledgers::default();
        ledgers.record_download("https://c/a.pdf", record("/m/shared.pdf"));
        let path = Path::new("/m/shared.pdf");

        assert_eq!(ledgers.downloaded.other_owner(path, "https://c/a.pdf"), None);
        assert_eq!(
            ledgers.downloaded.other_owner(path, "https://c/b.pdf"),
            Some("https://c/a.pdf")
        );
        assert_eq!(
            ledgers.downloaded.path_owners().get(path).map(String::as_str),
            Some("https://c/a.pdf")
        );
    }

    #[test]
    fn test_relocate_rewrites_path_only() {
        let mut ledgers = Ledgers::default();
        ledgers.record_download("https://c/a.pdf", record("/old/a.pdf"));

        assert!(ledgers.downloaded.relocate("https://c/a.pdf", PathBuf::from("/new/a.pdf")));
        assert!(!ledgers.downloaded.relocate("https://c/b.pdf", PathBuf::from("/new/b.pdf")));

        let moved = ledgers.downloaded.get("https://c/a.pdf").unwrap();
        assert_eq!(moved.path, PathBuf::from("/new/a.pdf"));
        assert_eq!(moved.hash, "abc");
    }

    #[test]
    fn test_observe_creates_new_records() {
        let mut ledgers = Ledgers::default();
        let added = ledgers.observe(&["https://c/a.pdf".to_string()], at(9));
        assert_eq!(added, 1);
        let doc = ledgers.discovered.get("https://c/a.pdf").unwrap();
        assert!(doc.is_new);
        assert!(!doc.downloaded);
        assert_eq!(doc.first_seen, at(9));
        assert_eq!(ledgers.discovered.last_full_scan, Some(at(9)));
    }

    #[test]
    fn test_observe_keeps_first_seen_and_flags_undownloaded_as_new() {
        let mut ledgers = Ledgers::default();
        let urls = vec!["https://c/a.pdf".to_string()];
        ledgers.observe(&urls, at(9));
        ledgers.discovered.files.get_mut("https://c/a.pdf").unwrap().is_new = false;

        let added = ledgers.observe(&urls, at(10));
        assert_eq!(added, 0);
        let doc = ledgers.discovered.get("https://c/a.pdf").unwrap();
        assert_eq!(doc.first_seen, at(9));
        assert_eq!(doc.last_seen, at(10));
        assert!(doc.is_new);
    }

    #[test]
    fn test_observe_does_not_reflag_downloaded_documents() {
        let mut ledgers = Ledgers::default();
        ledgers.record_download("https://c/a.pdf", record("/tmp/a.pdf"));
        ledgers.observe(&["https://c/a.pdf".to_string()], at(13));
        assert!(!ledgers.discovered.get("https://c/a.pdf").unwrap().is_new);
    }

    #[test]
    fn test_record_download_marks_document() {
        let mut ledgers = Ledgers::default();
        ledgers.observe(&["https://c/a.pdf".to_string()], at(9));
        ledgers.record_download("https://c/a.pdf", record("/tmp/a.pdf"));

        let doc = ledgers.discovered.get("https://c/a.pdf").unwrap();
        assert!(doc.downloaded);
        assert!(!doc.is_new);
        assert_eq!(doc.last_downloaded, Some(at(12)));
        assert_eq!(ledgers.downloaded.get("https://c/a.pdf").unwrap().size, 2048);
    }

    #[test]
    fn test_known_urls_is_union() {
        let mut ledgers = Ledgers::default();
        ledgers.observe(&["https://c/a.pdf".to_string()], at(9));
        ledgers
            .downloaded
            .insert("https://c/b.pdf", record("/tmp/b.pdf"));
        let urls: Vec<_> = ledgers.known_urls().into_iter().collect();
        assert_eq!(urls, vec!["https://c/a.pdf", "https://c/b.pdf"]);
    }

    #[test]
    fn test_download_method_serializes_snake_case() {
        let json = serde_json::to_string(&DownloadMethod::RecordFixed).unwrap();
        assert_eq!(json, "\"record_fixed\"");
        assert_eq!(DownloadMethod::Browser.to_string(), "browser");
    }

    #[test]
    fn test_downloaded_ledger_is_flat_json_object() {
        let mut ledger = DownloadedLedger::default();
        ledger.insert("https://c/a.pdf", record("/tmp/a.pdf"));
        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(value["https://c/a.pdf"]["method"], "basic");
        assert_eq!(value["https://c/a.pdf"]["size"], 2048);
    }

    #[test]
    fn test_first_run_marker() {
        let mut ledgers = Ledgers::default();
        assert!(ledgers.is_first_run());
        ledgers.mark_first_run_completed(at(18));
        assert!(!ledgers.is_first_run());
        assert_eq!(ledgers.first_run.completed_at, Some(at(18)));
    }
}
