//! Filesystem view used by the reconciler.

use std::path::Path;

use crate::download::content_hash;

/// Answers questions about files on disk.
pub trait FileOracle {
    /// True when a regular file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// SHA-256 hex digest and size in bytes of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error if the file cannot be read.
    fn fingerprint(&self, path: &Path) -> std::io::Result<(String, u64)>;
}

/// [`FileOracle`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOracle;

impl FileOracle for FsOracle {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn fingerprint(&self, path: &Path) -> std::io::Result<(String, u64)> {
        let bytes = std::fs::read(path)?;
        Ok((content_hash(&bytes), bytes.len() as u64))
    }
}
