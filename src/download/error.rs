//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so that a failure can be
//! logged and counted per document without aborting the rest of the cycle.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching or saving a document.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// Body too small to be a real document (error page, placeholder, truncated).
    #[error("undersized content from {url}: {bytes} bytes (minimum {minimum})")]
    Undersized {
        /// The URL that returned the short body.
        url: String,
        /// Bytes actually received.
        bytes: u64,
        /// Configured minimum.
        minimum: u64,
    },

    /// File system error while creating directories, backing up or writing.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed (TLS backend, proxy settings).
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The target file is recorded for a different URL.
    #[error("{path} belongs to {owner}")]
    PathClaimed {
        /// The file that would have been overwritten.
        path: PathBuf,
        /// URL whose record points at the file.
        owner: String,
    },

    /// Every candidate backup name for a changed file is already taken.
    #[error("no free backup name for {path}")]
    BackupExhausted {
        /// The file that could not be backed up.
        path: PathBuf,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an undersized-content error.
    pub fn undersized(url: impl Into<String>, bytes: u64, minimum: u64) -> Self {
        Self::Undersized {
            url: url.into(),
            bytes,
            minimum,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for failures of the local filesystem rather than the remote.
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::BackupExhausted { .. } | Self::PathClaimed { .. }
        )
    }
}

// No `From<reqwest::Error>` or `From<std::io::Error>`: every variant needs the
// URL or path, which the source errors do not carry.
