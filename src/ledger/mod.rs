//! Persisted state across runs.
//!
//! Three sources of truth live in the state directory:
//! - [`DiscoveredLedger`] - every URL a crawl has ever listed
//! - [`DownloadedLedger`] - hash, path and provenance of every saved file
//! - [`FirstRunMarker`] - whether a full cycle has completed
//!
//! [`Ledgers`] bundles them for one cycle; [`LedgerStore`] loads and saves
//! them atomically.

mod error;
mod record;
mod store;

pub use error::LedgerError;
pub use record::{
    DiscoveredLedger, DocumentRecord, DownloadMethod, DownloadRecord, DownloadedLedger,
    FirstRunMarker, Ledgers,
};
pub use store::{
    DISCOVERED_FILE, DOWNLOADED_FILE, FIRST_RUN_FILE, LOCK_FILE, LedgerStore, StateLock,
};
