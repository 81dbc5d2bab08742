//! URL classification and storage layout.
//!
//! Everything here is a pure function of the URL (plus, for
//! [`StorageLayout::target_path`], a server-asserted filename). The same URL
//! always lands in the same directory under the same name.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::download::filename::{
    disambiguate_path, filename_from_url, has_extension, parse_content_disposition,
    sanitize_filename, shorten_filename, url_hash8,
};

/// Fixed root directory for the court mirror inside the download directory.
pub const COURT_ROOT: &str = "AIFC_Court";

const JUDGMENT_MARKERS: &[&str] = &[
    "judgments",
    "judgment",
    "/uploads/",
    "case%20no",
    "case_no",
    "case-no",
    "decision",
    "ruling",
];

const LEGISLATION_MARKERS: &[&str] = &[
    "legislation",
    "/legals/",
    "regulations",
    "rules",
    "policy",
    "consultation-paper",
    "guidance",
    "notice",
    "amendment",
    "circular",
    "directive",
    "order",
    "aifc-court-regulations",
    "aifc-court-rules",
    "template-of-offering",
    "afsa-policy",
];

const LEGISLATION_SUBTYPES: &[(&str, &str)] = &[
    ("consultation-paper", "Consultation_Papers"),
    ("guidance", "Guidance_Documents"),
    ("notice", "Notices"),
    ("template", "Templates"),
];

#[allow(clippy::expect_used)]
static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"20\d{2}").expect("year pattern is valid"));

/// Top-level document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Judgments,
    Legislation,
    Other,
}

impl Category {
    /// Directory name directly under [`COURT_ROOT`].
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Judgments => "Judgments",
            Self::Legislation => "Legislation",
            Self::Other => "Other_Documents",
        }
    }

    /// Prefix of the hash-based fallback filename.
    fn fallback_prefix(self) -> &'static str {
        match self {
            Self::Judgments => "judgment",
            Self::Legislation => "legislation",
            Self::Other => "document",
        }
    }

    /// All categories, in directory order.
    pub const ALL: [Category; 3] = [Self::Judgments, Self::Legislation, Self::Other];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Category of a URL and its directory relative to [`COURT_ROOT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub relative_dir: PathBuf,
}

/// Classifies `url`. Total: anything unrecognised is [`Category::Other`].
///
/// Judgments are nested by the first `20xx` year in the percent-decoded
/// path and query (never the host or port); legislation by sub-type.
#[must_use]
pub fn classify(url: &str) -> Classification {
    let lower = url.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| lower.contains(marker));

    if contains_any(JUDGMENT_MARKERS) {
        let mut relative_dir = PathBuf::from(Category::Judgments.dir_name());
        let decoded = decoded_path(url);
        if let Some(year) = YEAR_PATTERN.find(&decoded) {
            relative_dir.push(year.as_str());
        }
        return Classification {
            category: Category::Judgments,
            relative_dir,
        };
    }

    if contains_any(LEGISLATION_MARKERS) {
        let mut relative_dir = PathBuf::from(Category::Legislation.dir_name());
        if let Some((_, subdir)) = LEGISLATION_SUBTYPES
            .iter()
            .find(|(marker, _)| lower.contains(marker))
        {
            relative_dir.push(subdir);
        }
        return Classification {
            category: Category::Legislation,
            relative_dir,
        };
    }

    Classification {
        category: Category::Other,
        relative_dir: PathBuf::from(Category::Other.dir_name()),
    }
}

/// Percent-decoded path and query of `url`; the whole string if it does not parse.
fn decoded_path(url: &str) -> String {
    let tail = match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    };
    urlencoding::decode(&tail).map_or(tail.clone(), |decoded| decoded.into_owned())
}

/// Derives the on-disk filename for `url`.
///
/// The Content-Disposition filename wins over the URL's last path segment.
/// The result is sanitized, gains `.pdf` when a judgment or legislation
/// name has no extension, falls back to `<category>_<hash8>.pdf`, and is
/// shortened to `max_len` characters.
#[must_use]
pub fn document_filename(url: &str, content_disposition: Option<&str>, max_len: usize) -> String {
    let category = classify(url).category;

    let raw = content_disposition
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| filename_from_url(url));
    let mut name = sanitize_filename(&raw);

    if !name.is_empty()
        && !has_extension(&name)
        && matches!(category, Category::Judgments | Category::Legislation)
    {
        name.push_str(".pdf");
    }

    if name.is_empty() || !has_extension(&name) {
        name = format!("{}_{}.pdf", category.fallback_prefix(), url_hash8(url));
    }

    shorten_filename(&name, url, max_len)
}

/// Maps URLs to absolute storage paths under a download directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    download_dir: PathBuf,
    max_filename_length: usize,
}

impl StorageLayout {
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>, max_filename_length: usize) -> Self {
        Self {
            download_dir: download_dir.into(),
            max_filename_length,
        }
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    #[must_use]
    pub fn max_filename_length(&self) -> usize {
        self.max_filename_length
    }

    /// `<download_dir>/AIFC_Court`.
    #[must_use]
    pub fn court_root(&self) -> PathBuf {
        self.download_dir.join(COURT_ROOT)
    }

    /// Directory a document from `url` is stored in.
    #[must_use]
    pub fn directory_for(&self, url: &str) -> PathBuf {
        self.court_root().join(classify(url).relative_dir)
    }

    /// Path predicted from the URL alone, used to find files on disk.
    #[must_use]
    pub fn predicted_path(&self, url: &str) -> PathBuf {
        self.target_path(url, None)
    }

    /// Predicted path with `_<hash8>` of `url` before the extension, for when
    /// another document already owns the predicted one.
    #[must_use]
    pub fn disambiguated_path(&self, url: &str) -> PathBuf {
        disambiguate_path(&self.predicted_path(url), url, self.max_filename_length)
    }

    /// Path for a fresh save, honouring a server-asserted filename.
    #[must_use]
    pub fn target_path(&self, url: &str, content_disposition: Option<&str>) -> PathBuf {
        self.directory_for(url).join(document_filename(
            url,
            content_disposition,
            self.max_filename_length,
        ))
    }
}
