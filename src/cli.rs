use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show warnings and errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Format of the summary printed at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable totals
    #[default]
    Human,
    /// One JSON object (events are written as JSON lines too)
    Json,
}

/// Turn XML test and inspection reports written during a build into report events
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-report-watcher")]
#[command(
    about = "Watch build output directories and report the contents of XML test/inspection reports while they are written"
)]
#[command(version)]
pub struct Cli {
    /// Directories to watch (non-recursive)
    #[arg(value_name = "ROOT")]
    pub roots: Vec<PathBuf>,

    /// Report dialect (junit, nunit, testng, mstest, ctest, findBugs, pmdCpd, jslint, ...)
    #[arg(short = 'd', long = "dialect")]
    pub dialect: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Milliseconds between two directory scans
    #[arg(long = "scan-interval-ms")]
    pub scan_interval_ms: Option<u64>,

    /// Attempts without file growth before a report is abandoned
    #[arg(long = "retry-budget")]
    pub retry_budget: Option<u32>,

    /// Milliseconds to wait between two attempts on the same report
    #[arg(long = "backoff-ms")]
    pub backoff_ms: Option<u64>,

    /// File extensions to watch (comma-separated)
    #[arg(short = 'e', long = "extensions", help = "File extensions to watch (e.g., 'xml,trx')")]
    pub extensions: Option<String>,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Build start time (RFC 3339); only files modified later are reported
    #[arg(long = "since", value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    /// Directory that reported source paths are made relative to (default: current directory)
    #[arg(long = "base-dir")]
    pub base_dir: Option<PathBuf>,

    /// Fail when more inspection errors than this are reported
    #[arg(long = "max-errors")]
    pub max_errors: Option<usize>,

    /// Fail when more inspection warnings than this are reported
    #[arg(long = "max-warnings")]
    pub max_warnings: Option<usize>,

    /// Stop after the build has run this many seconds instead of waiting for stdin to close
    #[arg(long = "duration-secs", conflicts_with = "once")]
    pub duration_secs: Option<u64>,

    /// Scan once, process everything found and stop
    #[arg(long = "once")]
    pub once: bool,

    /// Verbose output (-vv for debug output)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Summary format
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Print the known dialect keys and exit
    #[arg(long = "list-dialects")]
    pub list_dialects: bool,
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        match (self.quiet, self.verbose) {
            (true, _) => VerbosityLevel::Quiet,
            (false, 0) => VerbosityLevel::Normal,
            (false, 1) => VerbosityLevel::Verbose,
            (false, _) => VerbosityLevel::Debug,
        }
    }
}
