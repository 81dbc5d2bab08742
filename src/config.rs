//! Monitor configuration.
//!
//! Loaded from a JSON file (default `monitor_config.json`). Every field is
//! optional; missing fields take the defaults below and a missing file means
//! all defaults. Values are range-checked by [`Config::validate`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::download::DEFAULT_MAX_RETRIES;
use crate::download::constants::{DEFAULT_MIN_FILE_SIZE, REQUEST_TIMEOUT_SECS};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "monitor_config.json";

/// Errors from loading or validating configuration. These are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// Which [`crate::Fetcher`] implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Plain HTTP requests identifying the tool.
    Basic,
    /// Browser-like session with cookies, browser headers and a Referer.
    #[default]
    Browser,
}

/// Full monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing pages crawled each cycle.
    pub urls: Vec<String>,
    /// Root of the document mirror.
    pub download_dir: PathBuf,
    /// Directory holding the ledgers and the run lock.
    pub state_dir: PathBuf,
    /// Extensions that mark a link as a document.
    pub file_extensions: Vec<String>,
    /// Link depth followed from each listing page.
    pub max_depth: u32,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub max_filename_length: usize,
    /// Bodies smaller than this are treated as failed fetches.
    pub min_file_size: u64,
    /// Attempts per document, including the first.
    pub max_retries: u32,
    pub fetch_mode: FetchMode,
    /// Re-fetch already downloaded documents to detect content changes.
    pub change_detection: bool,
    /// Pause between cycles in `watch` mode.
    pub check_interval_minutes: u64,
    pub human_behavior: HumanBehavior,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://court.aifc.kz/en/judgments".to_string(),
                "https://court.aifc.kz/en/legislation".to_string(),
            ],
            download_dir: PathBuf::from("aifc_documents"),
            state_dir: PathBuf::from("."),
            file_extensions: [".pdf", ".doc", ".docx", ".xls", ".xlsx", ".txt", ".zip", ".rar"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_depth: 3,
            timeout: REQUEST_TIMEOUT_SECS,
            max_filename_length: 150,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            fetch_mode: FetchMode::default(),
            change_detection: true,
            check_interval_minutes: 120,
            human_behavior: HumanBehavior::default(),
        }
    }
}

/// Timing policy consumed by the orchestrator only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanBehavior {
    /// Shortest monitoring session, in seconds.
    pub min_session_time: u64,
    /// Longest monitoring session, in seconds.
    pub max_session_time: u64,
    /// Chance of a short break after a download.
    pub short_break_probability: f64,
    /// Chance of a long break after a download.
    pub long_break_probability: f64,
    pub initial_download_probability_min: f64,
    pub initial_download_probability_max: f64,
    pub monitoring_download_probability_min: f64,
    pub monitoring_download_probability_max: f64,
    /// First hour of the working window (inclusive).
    pub working_hours_start: u32,
    /// End hour of the working window (exclusive).
    pub working_hours_end: u32,
    /// Weekdays with 0 = Monday.
    pub working_days: Vec<u32>,
    /// Always download on the first run, ignoring the probabilities.
    pub first_run_always_download: bool,
    pub download_delay_min_secs: f64,
    pub download_delay_max_secs: f64,
    /// Relative jitter applied to `check_interval_minutes`.
    pub interval_variation: f64,
}

impl Default for HumanBehavior {
    fn default() -> Self {
        Self {
            min_session_time: 120,
            max_session_time: 600,
            short_break_probability: 0.05,
            long_break_probability: 0.05,
            initial_download_probability_min: 0.5,
            initial_download_probability_max: 0.8,
            monitoring_download_probability_min: 0.15,
            monitoring_download_probability_max: 0.45,
            working_hours_start: 9,
            working_hours_end: 18,
            working_days: vec![0, 1, 2, 3, 4],
            first_run_always_download: true,
            download_delay_min_secs: 1.0,
            download_delay_max_secs: 3.0,
            interval_variation: 0.3,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read,
    /// is not valid JSON, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read(path) {
            Ok(bytes) => {
                let config: Self = serde_json::from_slice(&bytes).map_err(|source| {
                    ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.timeout) {
            return Err(ConfigError::invalid("timeout", self.timeout, "range 1..=3600"));
        }
        if self.max_depth > 10 {
            return Err(ConfigError::invalid("max_depth", self.max_depth, "range 0..=10"));
        }
        if !(16..=255).contains(&self.max_filename_length) {
            return Err(ConfigError::invalid(
                "max_filename_length",
                self.max_filename_length,
                "range 16..=255",
            ));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::invalid("max_retries", self.max_retries, "range 1..=10"));
        }
        if !(1..=10_080).contains(&self.check_interval_minutes) {
            return Err(ConfigError::invalid(
                "check_interval_minutes",
                self.check_interval_minutes,
                "range 1..=10080",
            ));
        }
        for url in &self.urls {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::invalid("urls", url, "absolute http(s) URLs"));
            }
        }
        self.human_behavior.validate()
    }
}

impl HumanBehavior {
    fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("short_break_probability", self.short_break_probability),
            ("long_break_probability", self.long_break_probability),
            (
                "initial_download_probability_min",
                self.initial_download_probability_min,
            ),
            (
                "initial_download_probability_max",
                self.initial_download_probability_max,
            ),
            (
                "monitoring_download_probability_min",
                self.monitoring_download_probability_min,
            ),
            (
                "monitoring_download_probability_max",
                self.monitoring_download_probability_max,
            ),
            ("interval_variation", self.interval_variation),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, value, "range 0..=1"));
            }
        }

        ordered_pair(
            "initial_download_probability_min",
            self.initial_download_probability_min,
            self.initial_download_probability_max,
        )?;
        ordered_pair(
            "monitoring_download_probability_min",
            self.monitoring_download_probability_min,
            self.monitoring_download_probability_max,
        )?;
        if self.download_delay_min_secs.is_nan() || self.download_delay_min_secs < 0.0 {
            return Err(ConfigError::invalid(
                "download_delay_min_secs",
                self.download_delay_min_secs,
                "a non-negative number",
            ));
        }
        ordered_pair(
            "download_delay_min_secs",
            self.download_delay_min_secs,
            self.download_delay_max_secs,
        )?;
        if self.min_session_time > self.max_session_time {
            return Err(ConfigError::invalid(
                "min_session_time",
                self.min_session_time,
                format!("at most max_session_time ({})", self.max_session_time),
            ));
        }

        if self.working_hours_end > 24 {
            return Err(ConfigError::invalid(
                "working_hours_end",
                self.working_hours_end,
                "range 0..=24",
            ));
        }
        if self.working_hours_start >= self.working_hours_end {
            return Err(ConfigError::invalid(
                "working_hours_start",
                self.working_hours_start,
                format!("less than working_hours_end ({})", self.working_hours_end),
            ));
        }
        if let Some(day) = self.working_days.iter().find(|day| **day > 6) {
            return Err(ConfigError::invalid("working_days", day, "weekdays 0..=6 (0 = Monday)"));
        }
        Ok(())
    }
}

fn ordered_pair(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::invalid(
            field,
            min,
            format!("at most the matching max ({max})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{"urls": ["https://court.example/en/judgments"], "fetch_mode": "basic",
                "human_behavior": {"working_hours_start": 8}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.urls, vec!["https://court.example/en/judgments"]);
        assert_eq!(config.fetch_mode, FetchMode::Basic);
        assert_eq!(config.human_behavior.working_hours_start, 8);
        assert_eq!(config.human_behavior.working_hours_end, 18);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, r#"{"browser_headless": true, "max_depth": 2}"#).unwrap();
        assert_eq!(Config::load(&path).unwrap().max_depth, 2);
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Config)>)> = vec![
            ("timeout", Box::new(|c| c.timeout = 0)),
            ("max_depth", Box::new(|c| c.max_depth = 11)),
            ("max_filename_length", Box::new(|c| c.max_filename_length = 8)),
            ("max_retries", Box::new(|c| c.max_retries = 0)),
            ("urls", Box::new(|c| c.urls = vec!["not a url".to_string()])),
            (
                "short_break_probability",
                Box::new(|c| c.human_behavior.short_break_probability = 1.5),
            ),
            (
                "working_hours_start",
                Box::new(|c| c.human_behavior.working_hours_start = 18),
            ),
            (
                "monitoring_download_probability_min",
                Box::new(|c| c.human_behavior.monitoring_download_probability_min = 0.9),
            ),
            (
                "working_days",
                Box::new(|c| c.human_behavior.working_days = vec![0, 7]),
            ),
        ];

        for (expected_field, mutate) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected invalid {expected_field}, got {other:?}"),
            }
        }
    }
}
