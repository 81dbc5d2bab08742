//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use court_monitor::FetchMode;
use court_monitor::config::DEFAULT_CONFIG_FILE;

/// Monitor the AIFC court website and mirror its documents locally.
///
/// The first run downloads everything reachable from the configured listing
/// pages; later runs only fetch what is new, missing or changed.
#[derive(Parser, Debug)]
#[command(name = "court-monitor")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Values that take precedence over the configuration file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Root directory for downloaded documents
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Directory holding the ledgers and the lock file
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Maximum download attempts per document (1-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// How listing pages and documents are fetched
    #[arg(long, global = true, value_enum)]
    pub fetch_mode: Option<FetchMode>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one monitoring cycle now
    Run {
        /// Ignore the working-hours window and the download probability
        #[arg(long)]
        force: bool,
    },
    /// Run cycles forever at the configured interval
    Watch,
    /// Reconcile ledgers with the disk without touching the network
    Audit,
    /// Show what the ledgers hold and what is on disk
    Report {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download ledger entries whose files are not on disk, without crawling
    RetryFailed,
    /// Move downloaded files into the directories their URLs classify to
    Reorganize {
        /// List the moves without touching any file
        #[arg(long)]
        dry_run: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::try_parse_from(["court-monitor", "run"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert!(matches!(cli.command, Command::Run { force: false }));
        assert_eq!(cli.overrides.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(cli.overrides.download_dir.is_none());
        assert!(cli.overrides.max_retries.is_none());
    }

    #[test]
    fn test_cli_subcommand_is_required() {
        let err = Cli::try_parse_from(["court-monitor"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_run_force() {
        let cli = Cli::try_parse_from(["court-monitor", "run", "--force"]).unwrap();
        assert!(matches!(cli.command, Command::Run { force: true }));
    }

    #[test]
    fn test_cli_report_json() {
        let cli = Cli::try_parse_from(["court-monitor", "report", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Report { json: true }));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "court-monitor",
            "audit",
            "-vv",
            "--download-dir",
            "/tmp/docs",
            "--state-dir",
            "/tmp/state",
            "--fetch-mode",
            "basic",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Audit));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides.download_dir, Some(PathBuf::from("/tmp/docs")));
        assert_eq!(cli.overrides.state_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(cli.overrides.fetch_mode, Some(FetchMode::Basic));
    }

    #[test]
    fn test_cli_retry_failed_subcommand() {
        let cli = Cli::try_parse_from(["court-monitor", "retry-failed", "-q"]).unwrap();
        assert!(matches!(cli.command, Command::RetryFailed));
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_reorganize_dry_run() {
        let cli = Cli::try_parse_from(["court-monitor", "reorganize", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Command::Reorganize { dry_run: true }));

        let cli = Cli::try_parse_from(["court-monitor", "reorganize"]).unwrap();
        assert!(matches!(cli.command, Command::Reorganize { dry_run: false }));
    }

    #[test]
    fn test_cli_max_retries_range() {
        let cli = Cli::try_parse_from(["court-monitor", "-r", "5", "run"]).unwrap();
        assert_eq!(cli.overrides.max_retries, Some(5));

        let err = Cli::try_parse_from(["court-monitor", "-r", "0", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Cli::try_parse_from(["court-monitor", "-r", "11", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_invalid_fetch_mode_rejected() {
        let err =
            Cli::try_parse_from(["court-monitor", "--fetch-mode", "curl", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["court-monitor", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
