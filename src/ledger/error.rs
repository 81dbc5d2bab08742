//! Error types for ledger persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from saving ledgers or taking the state lock.
///
/// Loading never returns these: a missing or corrupt ledger falls back to an
/// empty one.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading, writing or renaming a state file failed.
    #[error("ledger IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A ledger could not be encoded as JSON.
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another run holds the state directory.
    #[error("state directory is locked by another run: {path}")]
    Locked { path: PathBuf },
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.into(),
            source,
        }
    }
}
