//! Applies a single download action: fetch with retry, compare, back up, write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use super::constants::{BACKUP_TIMESTAMP_FORMAT, DEFAULT_MIN_FILE_SIZE};
use super::error::DownloadError;
use super::fetcher::{FetchedDocument, Fetcher};
use super::filename::{backup_path, disambiguate_path};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_delay};
use crate::atomic_write::write_atomic;
use crate::classify::document_filename;
use crate::ledger::{DownloadRecord, Ledgers};
use crate::schedule::sleep_unless_interrupted;

/// Result of executing one download.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// No prior file; bytes written to `path`.
    New { path: PathBuf },
    /// Content changed; the previous file was copied to `backup` first.
    Updated { path: PathBuf, backup: PathBuf },
    /// Content identical to the file on disk; nothing written.
    Unchanged { path: PathBuf },
    /// Fetch or write failed; ledgers untouched.
    Failed(DownloadError),
}

impl ExecuteOutcome {
    /// True when bytes were written and the ledgers need saving.
    #[must_use]
    pub fn wrote_file(&self) -> bool {
        matches!(self, Self::New { .. } | Self::Updated { .. })
    }
}

/// Fetches documents and reconciles them with what is already on disk.
pub struct DownloadExecutor {
    fetcher: Arc<dyn Fetcher>,
    retry_policy: RetryPolicy,
    min_file_size: u64,
    max_filename_length: usize,
    interrupted: Arc<AtomicBool>,
}

impl std::fmt::Debug for DownloadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadExecutor")
            .field("method", &self.fetcher.method())
            .field("retry_policy", &self.retry_policy)
            .field("min_file_size", &self.min_file_size)
            .field("max_filename_length", &self.max_filename_length)
            .finish()
    }
}

impl DownloadExecutor {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, retry_policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            retry_policy,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            max_filename_length: 150,
            interrupted: Arc::default(),
        }
    }

    /// Retry waits end early, with the last error, once `interrupted` is set.
    #[must_use]
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// Bodies shorter than this many bytes count as failed fetches.
    #[must_use]
    pub fn with_min_file_size(mut self, min_file_size: u64) -> Self {
        self.min_file_size = min_file_size;
        self
    }

    /// Length limit for names taken from Content-Disposition.
    #[must_use]
    pub fn with_max_filename_length(mut self, max_filename_length: usize) -> Self {
        self.max_filename_length = max_filename_length;
        self
    }

    /// Downloads `url` towards `target` and updates `ledgers` on success.
    ///
    /// When the ledger has no record for `url`, a Content-Disposition filename
    /// replaces the file name of `target` (the directory is kept). Failures
    /// leave `ledgers` untouched so the URL stays eligible next run.
    #[instrument(skip(self, ledgers), fields(url = %url, target = %target.display()))]
    pub async fn execute(&self, url: &str, target: &Path, ledgers: &mut Ledgers) -> ExecuteOutcome {
        let document = match self.fetch_with_retry(url).await {
            Ok(document) => document,
            Err(error) => {
                warn!(error = %error, "download failed");
                return ExecuteOutcome::Failed(error);
            }
        };

        let path = self.resolve_path(url, target, &document, ledgers);
        match self.store(url, &path, &document, ledgers) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(error = %error, path = %path.display(), "saving document failed");
                ExecuteOutcome::Failed(error)
            }
        }
    }

    fn resolve_path(
        &self,
        url: &str,
        target: &Path,
        document: &FetchedDocument,
        ledgers: &Ledgers,
    ) -> PathBuf {
        let path = match document.content_disposition.as_deref() {
            Some(disposition) if ledgers.downloaded.get(url).is_none() => {
                let name = document_filename(url, Some(disposition), self.max_filename_length);
                match target.parent() {
                    Some(dir) => dir.join(name),
                    None => PathBuf::from(name),
                }
            }
            _ => target.to_path_buf(),
        };

        match ledgers.downloaded.other_owner(&path, url) {
            Some(owner) => {
                let unique = disambiguate_path(&path, url, self.max_filename_length);
                info!(owner = %owner, path = %unique.display(), "target belongs to another document");
                unique
            }
            None => path,
        }
    }

    fn store(
        &self,
        url: &str,
        path: &Path,
        document: &FetchedDocument,
        ledgers: &mut Ledgers,
    ) -> Result<ExecuteOutcome, DownloadError> {
        let now = Utc::now();
        let hash = content_hash(&document.bytes);
        let prior_hash = existing_hash(url, path, ledgers)?;

        let outcome = match prior_hash {
            Some(prior) if prior == hash => {
                info!(path = %path.display(), "content unchanged");
                ledgers.mark_confirmed(url, now);
                if ledgers
                    .downloaded
                    .get(url)
                    .is_none_or(|record| record.path != path)
                {
                    ledgers.record_download(url, self.record(path, hash, document.len(), now));
                }
                return Ok(ExecuteOutcome::Unchanged {
                    path: path.to_path_buf(),
                });
            }
            Some(_) => {
                let backup = back_up(path, now)?;
                write_atomic(path, &document.bytes).map_err(|e| DownloadError::io(path, e))?;
                info!(path = %path.display(), backup = %backup.display(), "content changed, previous version kept");
                ExecuteOutcome::Updated {
                    path: path.to_path_buf(),
                    backup,
                }
            }
            None => {
                write_atomic(path, &document.bytes).map_err(|e| DownloadError::io(path, e))?;
                info!(path = %path.display(), bytes = document.len(), "new document saved");
                ExecuteOutcome::New {
                    path: path.to_path_buf(),
                }
            }
        };

        ledgers.record_download(url, self.record(path, hash, document.len(), now));
        Ok(outcome)
    }

    fn record(&self, path: &Path, hash: String, size: u64, now: DateTime<Utc>) -> DownloadRecord {
        DownloadRecord {
            hash,
            path: path.to_path_buf(),
            downloaded_at: now,
            size,
            method: self.fetcher.method(),
        }
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<FetchedDocument, DownloadError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            let result = self.fetcher.fetch(url).await.and_then(|document| {
                if document.len() < self.min_file_size {
                    Err(DownloadError::undersized(url, document.len(), self.min_file_size))
                } else {
                    Ok(document)
                }
            });

            let error = match result {
                Ok(document) => return Ok(document),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            let retry_after = if failure_type == FailureType::RateLimited {
                retry_after_delay(&error)
            } else {
                None
            };

            match self.retry_policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after.unwrap_or(backoff_delay);
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after.is_some(),
                        error = %error,
                        "retrying download"
                    );
                    if !sleep_unless_interrupted(delay, &self.interrupted).await {
                        debug!("interrupted while waiting to retry");
                        return Err(error);
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying download");
                    return Err(error);
                }
            }
        }
    }
}

/// SHA-256 hex digest of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hashes the file at `path`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String, DownloadError> {
    let bytes = std::fs::read(path).map_err(|e| DownloadError::io(path, e))?;
    Ok(content_hash(&bytes))
}

/// Hash of what is currently on disk at `path`, if anything.
///
/// The recorded hash is trusted only when the record points at `path`;
/// otherwise the file is hashed. A file recorded for another URL is
/// never hashed or backed up.
fn existing_hash(url: &str, path: &Path, ledgers: &Ledgers) -> Result<Option<String>, DownloadError> {
    if let Some(owner) = ledgers.downloaded.other_owner(path, url) {
        return Err(DownloadError::PathClaimed {
            path: path.to_path_buf(),
            owner: owner.to_string(),
        });
    }
    if !path.exists() {
        return Ok(None);
    }
    match ledgers.downloaded.get(url) {
        Some(record) if record.path == path => Ok(Some(record.hash.clone())),
        _ => hash_file(path).map(Some),
    }
}

fn back_up(path: &Path, now: DateTime<Utc>) -> Result<PathBuf, DownloadError> {
    let stamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let backup = backup_path(path, &stamp)?;
    std::fs::copy(path, &backup).map_err(|e| DownloadError::io(&backup, e))?;
    Ok(backup)
}
