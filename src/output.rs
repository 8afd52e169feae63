//! Run summary output
//!
//! Formats the totals printed once the build has finished.

use std::time::Duration;

use serde_json::json;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::processor::RunSummary;
use crate::watcher::{RootStatus, WatchSummary};

/// Formatter for the end-of-run summary
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(
        &self,
        summary: &RunSummary,
        watch: &WatchSummary,
        violations: &[String],
        elapsed: Duration,
    ) -> String {
        match self.format {
            OutputFormat::Json => self.format_json(summary, watch, violations, elapsed),
            OutputFormat::Human => self.format_human(summary, watch, violations, elapsed),
        }
    }

    fn format_human(
        &self,
        summary: &RunSummary,
        watch: &WatchSummary,
        violations: &[String],
        elapsed: Duration,
    ) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            if !summary.is_success() {
                output.push_str(&format!("Failed reports: {}\n", summary.files_failed));
            }
            for violation in violations {
                output.push_str(violation);
                output.push('\n');
            }
            return output;
        }

        output.push_str("Report Summary:\n");
        output.push_str(&format!("  Reports: {}\n", summary.files()));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Processed:", "32"),
            summary.files_done
        ));
        if summary.files_abandoned > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Incomplete:", "33"),
                summary.files_abandoned
            ));
        }
        if summary.files_failed > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Failed:", "31"),
                summary.files_failed
            ));
        }

        let totals = &summary.totals;
        if totals.suites > 0 || totals.tests > 0 {
            output.push_str(&format!(
                "  Suites: {}  Tests: {}\n",
                totals.suites, totals.tests
            ));
        }
        if totals.inspections() > 0 {
            output.push_str(&format!(
                "  Inspections: {} errors, {} warnings, {} infos\n",
                totals.errors, totals.warnings, totals.infos
            ));
        }
        if totals.duplicates > 0 {
            output.push_str(&format!("  Duplicates: {}\n", totals.duplicates));
        }
        if let Some(failure) = &totals.failure {
            output.push_str(&format!("  {} {}\n", self.colorize("Failure:", "31"), failure));
        }
        for violation in violations {
            output.push_str(&format!("  {}\n", self.colorize(violation, "31")));
        }
        output.push_str(&format!("  Duration: {}\n", format_duration(elapsed)));

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str("\nWatched Directories:\n");
            for (root, status) in &watch.roots {
                output.push_str(&format!("  {}: {}\n", root.display(), status_label(*status)));
            }
            output.push_str(&format!(
                "  Scans: {}  Files found: {}\n",
                watch.scans, watch.enqueued
            ));
        }

        output
    }

    fn format_json(
        &self,
        summary: &RunSummary,
        watch: &WatchSummary,
        violations: &[String],
        elapsed: Duration,
    ) -> String {
        let roots: Vec<_> = watch
            .roots
            .iter()
            .map(|(root, status)| json!({ "root": root, "status": status_label(*status) }))
            .collect();
        json!({
            "summary": summary,
            "roots": roots,
            "scans": watch.scans,
            "violations": violations,
            "duration_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "success": summary.is_success() && violations.is_empty(),
        })
        .to_string()
    }
}

fn status_label(status: RootStatus) -> &'static str {
    match status {
        RootStatus::Active => "active",
        RootStatus::Missing => "does not exist",
        RootStatus::NotADirectory => "not a directory",
        RootStatus::Empty => "empty",
        RootStatus::NoMatchingFiles => "no matching files",
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
