//! The fetch capability consumed by the crawl and the executor.

use async_trait::async_trait;

use super::DownloadError;
use crate::ledger::DownloadMethod;

/// A successfully fetched response body with the headers the executor needs.
#[derive(Debug, Clone, Default)]
pub struct FetchedDocument {
    /// Complete response body.
    pub bytes: Vec<u8>,
    /// Raw `Content-Disposition` header, if the server sent one.
    pub content_disposition: Option<String>,
    /// Raw `Content-Type` header, if the server sent one.
    pub content_type: Option<String>,
}

impl FetchedDocument {
    /// Body-only document, mostly useful for fakes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// True when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Retrieves listing pages and document bodies.
///
/// Implementations do a single attempt per call; retry and pacing live in
/// [`super::DownloadExecutor`] and the cycle.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and returns the full body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for network failures, timeouts and
    /// non-success statuses.
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, DownloadError>;

    /// Crawls `listing_url` and returns the document URLs found, deduplicated,
    /// in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] only when the listing page itself cannot be
    /// fetched; failures on deeper pages are logged and skipped.
    async fn list_documents(&self, listing_url: &str) -> Result<Vec<String>, DownloadError>;

    /// Provenance tag written to the download ledger.
    fn method(&self) -> DownloadMethod;
}
