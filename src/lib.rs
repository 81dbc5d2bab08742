//! Court Monitor Core Library
//!
//! This library keeps a local mirror of the documents published on a court
//! website. Each monitoring cycle crawls the configured listing pages,
//! reconciles what it finds against two persisted ledgers and the files
//! actually present on disk, and downloads only what is new, missing or
//! changed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`classify`] - Pure URL to category/storage path mapping
//! - [`ledger`] - Discovered/downloaded ledgers and their atomic JSON store
//! - [`reconcile`] - The reconciliation engine producing per-URL dispositions
//! - [`download`] - Fetcher capability, retry policy and the download executor
//! - [`cycle`] - One crawl, reconcile, execute and persist pass
//! - [`config`] - JSON configuration with validation
//! - [`schedule`] - Working-hours window and pacing used by the orchestrator
//! - [`report`] - Read-only summaries over the ledgers and the download tree
//! - [`reorganize`] - Moves recorded files back under the classified layout

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod cycle;
pub mod download;
pub mod ledger;
pub mod reconcile;
pub mod reorganize;
pub mod report;
pub mod schedule;
mod atomic_write;
mod user_agent;

// Re-export commonly used types
pub use classify::{Category, Classification, StorageLayout, classify, document_filename};
pub use config::{Config, ConfigError, FetchMode, HumanBehavior};
pub use cycle::{CycleError, CycleOptions, CycleScope, CycleSummary, MonitorCycle, Pacing};
pub use download::{
    BasicFetcher, BrowserFetcher, DEFAULT_MAX_RETRIES, DownloadError, DownloadExecutor,
    ExecuteOutcome, FailureType, FetchedDocument, Fetcher, RetryDecision, RetryPolicy,
    build_fetcher, classify_error,
};
pub use ledger::{
    DiscoveredLedger, DocumentRecord, DownloadMethod, DownloadRecord, DownloadedLedger,
    FirstRunMarker, LedgerError, LedgerStore, Ledgers, StateLock,
};
pub use reconcile::{
    Action, ActionPlan, Disposition, FileOracle, FsOracle, PlanEntry, Reconciler, RunMode,
};
pub use reorganize::{Relocation, ReorganizeSummary, plan_relocations, reorganize};
pub use report::{CategoryUsage, LedgerReport};
