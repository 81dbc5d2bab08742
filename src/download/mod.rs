//! Fetching and saving documents.
//!
//! # Overview
//!
//! - [`Fetcher`] - the fetch capability, with [`BasicFetcher`] and
//!   [`BrowserFetcher`] implementations selected by [`build_fetcher`]
//! - [`DownloadExecutor`] - fetch with retry, hash comparison, backup and
//!   atomic write for a single URL
//! - [`RetryPolicy`] - exponential backoff with jitter, honouring Retry-After
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use court_monitor::{Config, DownloadExecutor, Ledgers, RetryPolicy, build_fetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let fetcher = Arc::from(build_fetcher(&config)?);
//! let executor = DownloadExecutor::new(fetcher, RetryPolicy::with_max_attempts(3));
//! let mut ledgers = Ledgers::default();
//! let outcome = executor
//!     .execute(
//!         "https://court.aifc.kz/uploads/judgments/case_no_1_2019.pdf",
//!         Path::new("./aifc_documents/AIFC_Court/Judgments/2019/case_no_1_2019.pdf"),
//!         &mut ledgers,
//!     )
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod client;
pub(crate) mod constants;
mod error;
mod executor;
mod fetcher;
pub(crate) mod filename;
mod links;
mod retry;

pub use client::{BasicFetcher, BrowserFetcher, FetcherSettings, build_fetcher};
pub use error::DownloadError;
pub use executor::{DownloadExecutor, ExecuteOutcome, content_hash, hash_file};
pub use fetcher::{FetchedDocument, Fetcher};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after, retry_after_delay,
};

// Use `Result<T, DownloadError>` explicitly in signatures; no module-local alias.
