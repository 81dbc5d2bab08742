//! In-memory [`Fetcher`] that counts every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use court_monitor::{DownloadError, DownloadMethod, FetchedDocument, Fetcher};

#[derive(Default)]
pub struct CountingFetcher {
    listings: Mutex<HashMap<String, Vec<String>>>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    listing_calls: AtomicUsize,
    interrupt_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

#[allow(dead_code)]
impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `documents` from `listing_url`, each with `body`.
    pub fn with_listing(self, listing_url: &str, documents: &[&str], body: &[u8]) -> Self {
        for url in documents {
            self.set_document(url, body);
        }
        self.listings.lock().unwrap().insert(
            listing_url.to_string(),
            documents.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn set_document(&self, url: &str, body: &[u8]) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    pub fn remove_document(&self, url: &str) {
        self.documents.lock().unwrap().remove(url);
    }

    /// Sets `flag` once `fetches` documents have been served.
    pub fn interrupt_after(&self, fetches: usize, flag: Arc<AtomicBool>) {
        *self.interrupt_after.lock().unwrap() = Some((fetches, flag));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, DownloadError> {
        let served = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, flag)) = self.interrupt_after.lock().unwrap().as_ref()
            && served >= *after
        {
            flag.store(true, Ordering::SeqCst);
        }
        let body = self.documents.lock().unwrap().get(url).cloned();
        body.map(FetchedDocument::from_bytes)
            .ok_or_else(|| DownloadError::http_status(url, 404))
    }

    async fn list_documents(&self, listing_url: &str) -> Result<Vec<String>, DownloadError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.listings
            .lock()
            .unwrap()
            .get(listing_url)
            .cloned()
            .ok_or_else(|| DownloadError::http_status(listing_url, 503))
    }

    fn method(&self) -> DownloadMethod {
        DownloadMethod::Basic
    }
}
