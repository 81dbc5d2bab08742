//! Constants for the download module (timeouts, size thresholds, backups).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (30 seconds); court documents are small PDFs.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bodies smaller than this are error pages or placeholders, not documents.
pub const DEFAULT_MIN_FILE_SIZE: u64 = 1000;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Upper bound on `_N` suffixes tried when a backup name is already taken.
pub const MAX_BACKUP_COUNTER: u32 = 999;

/// Timestamp format appended to backup copies (`file.pdf.backup_20240131_174502`).
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Upper bound on pages fetched while crawling one listing URL.
pub const MAX_CRAWL_PAGES: usize = 500;
