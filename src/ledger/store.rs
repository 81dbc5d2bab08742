//! JSON persistence for the ledgers and the state-directory lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::error::LedgerError;
use super::record::{DiscoveredLedger, DownloadedLedger, FirstRunMarker, Ledgers};
use crate::atomic_write::write_atomic;

/// Discovered ledger file name inside the state directory.
pub const DISCOVERED_FILE: &str = "discovered_files.json";
/// Downloaded ledger file name inside the state directory.
pub const DOWNLOADED_FILE: &str = "downloaded_files.json";
/// First-run marker file name inside the state directory.
pub const FIRST_RUN_FILE: &str = "first_run_completed.json";
/// Advisory lock file guarding a run.
pub const LOCK_FILE: &str = ".court-monitor.lock";

/// Loads and saves the ledgers of one state directory.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    state_dir: PathBuf,
}

impl LedgerStore {
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    /// Loads all three ledgers. Never fails; see [`Self::load_discovered`].
    #[instrument(skip(self), fields(state_dir = %self.state_dir.display()))]
    pub fn load(&self) -> Ledgers {
        let ledgers = Ledgers {
            discovered: self.load_discovered(),
            downloaded: self.load_downloaded(),
            first_run: self.load_first_run(),
        };
        info!(
            discovered = ledgers.discovered.len(),
            downloaded = ledgers.downloaded.len(),
            first_run = ledgers.is_first_run(),
            "ledgers loaded"
        );
        ledgers
    }

    /// Loads the discovered ledger.
    ///
    /// A missing file yields an empty ledger. A corrupt file is moved aside
    /// as `<name>.corrupt-<timestamp>` and also yields an empty ledger.
    #[must_use]
    pub fn load_discovered(&self) -> DiscoveredLedger {
        load_or_default(&self.file(DISCOVERED_FILE))
    }

    #[must_use]
    pub fn load_downloaded(&self) -> DownloadedLedger {
        load_or_default(&self.file(DOWNLOADED_FILE))
    }

    #[must_use]
    pub fn load_first_run(&self) -> FirstRunMarker {
        load_or_default(&self.file(FIRST_RUN_FILE))
    }

    /// Saves the discovered and downloaded ledgers.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if either file cannot be written. The previous
    /// complete version stays in place.
    pub fn save(&self, ledgers: &Ledgers) -> Result<(), LedgerError> {
        self.save_discovered(&ledgers.discovered)?;
        self.save_downloaded(&ledgers.downloaded)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file cannot be written.
    pub fn save_discovered(&self, ledger: &DiscoveredLedger) -> Result<(), LedgerError> {
        save_json(&self.file(DISCOVERED_FILE), ledger)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file cannot be written.
    pub fn save_downloaded(&self, ledger: &DownloadedLedger) -> Result<(), LedgerError> {
        save_json(&self.file(DOWNLOADED_FILE), ledger)
    }

    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file cannot be written.
    pub fn save_first_run(&self, marker: &FirstRunMarker) -> Result<(), LedgerError> {
        save_json(&self.file(FIRST_RUN_FILE), marker)
    }

    /// Takes the exclusive run lock on the state directory.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Locked`] when another process holds it, or
    /// [`LedgerError::Io`] if the lock file cannot be opened.
    pub fn lock(&self) -> Result<StateLock, LedgerError> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| LedgerError::io(&self.state_dir, e))?;

        let path = self.file(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LedgerError::io(&path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "state lock acquired");
                Ok(StateLock { file, path })
            }
            Err(error) if is_contended(&error) => Err(LedgerError::Locked { path }),
            Err(error) => Err(LedgerError::io(path, error)),
        }
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %error, "failed to release state lock");
        }
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no ledger yet, starting empty");
            return T::default();
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "ledger unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "ledger corrupt, starting empty");
            quarantine(path);
            T::default()
        }
    }
}

fn quarantine(path: &Path) {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let aside = path.with_file_name(format!("{name}.corrupt-{stamp}"));
    match std::fs::rename(path, &aside) {
        Ok(()) => warn!(moved_to = %aside.display(), "corrupt ledger moved aside"),
        Err(error) => warn!(path = %path.display(), error = %error, "could not move corrupt ledger aside"),
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| LedgerError::serialize(path, e))?;
    write_atomic(path, &bytes).map_err(|e| LedgerError::io(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "ledger saved");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::{DownloadMethod, DownloadRecord};
    use tempfile::TempDir;

    #[test]
    fn test_load_cold_start_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path().join("state"));
        let ledgers = store.load();
        assert!(ledgers.discovered.is_empty());
        assert!(ledgers.downloaded.is_empty());
        assert!(ledgers.is_first_run());
    }

    #[test]
    fn test_save_then_load_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        let now = Utc::now();

        let mut ledgers = Ledgers::default();
        ledgers.observe(&["https://c/a.pdf".to_string()], now);
        ledgers.record_download(
            "https://c/a.pdf",
            DownloadRecord {
                hash: "ff".to_string(),
                path: temp_dir.path().join("a.pdf"),
                downloaded_at: now,
                size: 1200,
                method: DownloadMethod::Browser,
            },
        );
        store.save(&ledgers).unwrap();
        ledgers.mark_first_run_completed(now);
        store.save_first_run(&ledgers.first_run).unwrap();

        assert_eq!(store.load(), ledgers);
    }

    #[test]
    fn test_corrupt_ledger_is_moved_aside() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        std::fs::write(temp_dir.path().join(DOWNLOADED_FILE), b"{ not json").unwrap();

        let ledger = store.load_downloaded();
        assert!(ledger.is_empty());
        assert!(!temp_dir.path().join(DOWNLOADED_FILE).exists());

        let moved = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .any(|name| name.starts_with("downloaded_files.json.corrupt-"));
        assert!(moved);
    }

    #[test]
    fn test_reads_legacy_first_run_marker() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());
        std::fs::write(
            temp_dir.path().join(FIRST_RUN_FILE),
            br#"{"completed": true, "completed_at": "2024-03-01T18:00:00Z"}"#,
        )
        .unwrap();
        assert!(store.load_first_run().completed);
    }

    #[test]
    fn test_second_lock_is_rejected_until_release() {
        let temp_dir = TempDir::new().unwrap();
        let store = LedgerStore::new(temp_dir.path());

        let held = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(LedgerError::Locked { .. })));

        drop(held);
        assert!(store.lock().is_ok());
    }
}
