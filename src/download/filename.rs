//! Filename extraction, sanitization, shortening and backup naming.
//!
//! These helpers are pure apart from [`backup_path`], which probes the
//! filesystem for a free name.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use super::DownloadError;
use super::constants::MAX_BACKUP_COUNTER;

/// Number of hex characters of the URL digest used to disambiguate names.
pub const URL_HASH_LEN: usize = 8;

/// First [`URL_HASH_LEN`] hex characters of the SHA-256 of `url`.
#[must_use]
pub fn url_hash8(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..URL_HASH_LEN].to_string()
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Decoded last path segment of `url`, or an empty string when there is none.
pub(crate) fn filename_from_url(url: &str) -> String {
    let raw_segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        }
    };

    urlencoding::decode(&raw_segment)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(raw_segment)
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Splits `name` into stem and extension (with the dot).
///
/// Only a short alphanumeric suffix counts as an extension, so
/// `case_no_1_2019` and `v1.2 final draft` have none.
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    if let Some(pos) = name.rfind('.')
        && pos > 0
    {
        let ext = &name[pos..];
        if (2..=12).contains(&ext.len()) && ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
            return (&name[..pos], ext);
        }
    }
    (name, "")
}

pub(crate) fn has_extension(name: &str) -> bool {
    !split_extension(name).1.is_empty()
}

/// Shortens `name` to at most `max_len` characters.
///
/// Keeps the first three hyphen-separated words of the stem and appends the
/// URL hash before the extension, so two long titles sharing a prefix never
/// collide.
pub(crate) fn shorten_filename(name: &str, url: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }
    hashed_short_name(name, url, max_len)
}

fn hashed_short_name(name: &str, url: &str, max_len: usize) -> String {
    let (stem, ext) = split_extension(name);
    let hash = url_hash8(url);
    let leading_words = stem
        .split('-')
        .filter(|word| !word.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join("-");

    let available = max_len.saturating_sub(ext.chars().count() + hash.len() + 1);
    let truncated: String = leading_words.chars().take(available).collect();
    let truncated = truncated.trim_end_matches(['-', '_', ' ', '.']);

    let short = if truncated.is_empty() {
        format!("{hash}{ext}")
    } else {
        format!("{truncated}_{hash}{ext}")
    };
    if short.chars().count() <= max_len {
        short
    } else {
        // Extension alone does not fit next to the hash.
        format!("{hash}.pdf").chars().take(max_len).collect()
    }
}

/// Makes `name` unique to `url` by inserting `_<hash8>` before the extension.
///
/// Names already carrying the URL hash are returned unchanged. The result
/// never exceeds `max_len` characters.
pub(crate) fn disambiguate_filename(name: &str, url: &str, max_len: usize) -> String {
    let hash = url_hash8(url);
    if name.contains(&hash) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let candidate = format!("{stem}_{hash}{ext}");
    if candidate.chars().count() <= max_len {
        candidate
    } else {
        hashed_short_name(name, url, max_len)
    }
}

/// `path` with its file name made unique to `url`.
pub(crate) fn disambiguate_path(path: &Path, url: &str, max_len: usize) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    path.with_file_name(disambiguate_filename(&name, url, max_len))
}

/// Finds a free backup name next to `path`: `<name>.backup_<stamp>`, then `_1`, `_2`, ...
///
/// # Errors
///
/// Returns [`DownloadError::BackupExhausted`] when every counter up to the
/// bound is taken.
pub(crate) fn backup_path(path: &Path, stamp: &str) -> Result<PathBuf, DownloadError> {
    backup_path_bounded(path, stamp, MAX_BACKUP_COUNTER)
}

fn backup_path_bounded(path: &Path, stamp: &str, max_counter: u32) -> Result<PathBuf, DownloadError> {
    let file_name = path
        .file_name()
        .map_or_else(|| "document".to_string(), |n| n.to_string_lossy().into_owned());

    let base = path.with_file_name(format!("{file_name}.backup_{stamp}"));
    if !base.exists() {
        return Ok(base);
    }

    for counter in 1..=max_counter {
        let candidate = path.with_file_name(format!("{file_name}.backup_{stamp}_{counter}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(DownloadError::BackupExhausted {
        path: path.to_path_buf(),
    })
}
