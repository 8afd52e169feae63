//! The report processor: takes discovered files off the queue and parses each
//! one repeatedly until it is complete, stops growing, or cannot be parsed.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigManager};
use crate::error::{ParseError, ReportError, Result};
use crate::parsers::{FormatParser, ParseOutcome, ParserFactory, ParsingResult, Snapshot};
use crate::queue::{ReportFile, ReportQueue};
use crate::sink::ReportingSink;

/// Timing and retry limits of the processor
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorSettings {
    /// Attempts without growth before a report is abandoned
    pub retry_budget: u32,
    pub backoff: Duration,
    pub poll_timeout: Duration,
    pub final_drain: Duration,
    /// Directory that reported source paths are made relative to
    pub base_dir: Option<PathBuf>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            retry_budget: 100,
            backoff: Duration::from_millis(300),
            poll_timeout: Duration::from_millis(500),
            final_drain: Duration::from_secs(5),
            base_dir: None,
        }
    }
}

impl ProcessorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_budget: config.processing.retry_budget,
            backoff: ConfigManager::get_backoff(config),
            poll_timeout: ConfigManager::get_poll_timeout(config),
            final_drain: ConfigManager::get_final_drain(config),
            base_dir: config.watch.base_dir.clone(),
        }
    }
}

/// Totals over every report handled by one processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_done: usize,
    pub files_abandoned: usize,
    pub files_failed: usize,
    #[serde(flatten)]
    pub totals: ParsingResult,
}

impl RunSummary {
    pub fn files(&self) -> usize {
        self.files_done + self.files_abandoned + self.files_failed
    }

    /// True when no report had the wrong format or could not be read
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    /// Messages for every inspection limit that was exceeded
    pub fn limit_violations(&self, max_errors: Option<usize>, max_warnings: Option<usize>) -> Vec<String> {
        let mut violations = Vec::new();
        let errors = self.totals.errors;
        let warnings = self.totals.warnings;
        if let Some(limit) = max_errors.filter(|limit| errors > *limit) {
            violations.push(format!(
                "Errors limit {limit} reached: found {errors} error{}",
                plural(errors)
            ));
        }
        if let Some(limit) = max_warnings.filter(|limit| warnings > *limit) {
            violations.push(format!(
                "Warnings limit {limit} reached: found {warnings} warning{}",
                plural(warnings)
            ));
        }
        violations
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// One-line description of a processed report
pub fn processed_message(path: &Path, result: &ParsingResult) -> String {
    let mut message = format!("{} report processed: ", path.display());
    if result.suites > 0 || result.tests > 0 {
        message.push_str(&format!("{} suite{}", result.suites, plural(result.suites)));
        if result.tests > 0 {
            message.push_str(&format!(", {} test{}", result.tests, plural(result.tests)));
        }
    } else if result.duplicates > 0 {
        message.push_str(&format!(
            "{} duplicate{}",
            result.duplicates,
            plural(result.duplicates)
        ));
    } else {
        message.push_str(&format!(
            "{} error{}, {} warning{}, {} info message{}",
            result.errors,
            plural(result.errors),
            result.warnings,
            plural(result.warnings),
            result.infos,
            plural(result.infos)
        ));
    }
    message
}

/// Tracking of one in-flight report
struct ReportState {
    file: ReportFile,
    parser: Box<dyn FormatParser>,
    /// Tests reported by earlier attempts
    emitted: usize,
    prev_len: u64,
    /// Consecutive attempts without growth
    retries: u32,
}

enum Attempt {
    Incomplete,
    Done(ParsingResult),
    Failed(ParseError),
    Unreadable(std::io::Error),
}

/// Drives repeated resumable parses of discovered reports
pub struct ReportProcessor<S: ReportingSink> {
    dialect: String,
    factory: ParserFactory,
    queue: ReportQueue,
    sink: S,
    settings: ProcessorSettings,
    /// Reports that reached a terminal state; never re-entered
    finished: HashSet<PathBuf>,
    summary: RunSummary,
}

impl<S: ReportingSink> ReportProcessor<S> {
    pub fn new(dialect: &str, factory: ParserFactory, queue: ReportQueue, sink: S) -> Self {
        Self {
            dialect: dialect.to_string(),
            factory,
            queue,
            sink,
            settings: ProcessorSettings::default(),
            finished: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProcessorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (RunSummary, S) {
        (self.summary, self.sink)
    }

    /// Process reports until `stop` is raised, then drain the queue and give
    /// every still-incomplete report one last attempt.
    pub fn run(&mut self, stop: &AtomicBool) -> RunSummary {
        let mut pending = Vec::new();
        while !stop.load(Ordering::SeqCst) {
            if let Some(file) = self.queue.poll(self.settings.poll_timeout) {
                pending.extend(self.process(file, stop));
            }
        }

        let deadline = Instant::now() + self.settings.final_drain;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.queue.poll(remaining.min(self.settings.poll_timeout)) {
                Some(file) => pending.extend(self.process(file, stop)),
                None => break,
            }
        }
        let left = self.queue.len();
        if left > 0 {
            warn!(files = left, "final drain timed out, reports left unprocessed");
        }

        for state in pending {
            self.final_attempt(state);
        }
        info!(
            files = self.summary.files(),
            done = self.summary.files_done,
            abandoned = self.summary.files_abandoned,
            failed = self.summary.files_failed,
            "report processing finished"
        );
        self.summary.clone()
    }

    /// Handle one report until it is finished, or until `stop` interrupts it;
    /// an interrupted report is returned for the final pass.
    fn process(&mut self, file: ReportFile, stop: &AtomicBool) -> Option<ReportState> {
        if self.finished.contains(&file.path) {
            debug!(path = %file.path.display(), "report already processed");
            return None;
        }
        let mut state = self.start(file);
        loop {
            match self.attempt(&mut state) {
                Attempt::Incomplete => {}
                terminal => {
                    self.conclude(state, terminal);
                    return None;
                }
            }
            if state.retries >= self.settings.retry_budget {
                self.abandon(state);
                return None;
            }
            if stop.load(Ordering::SeqCst) {
                return Some(state);
            }
            thread::sleep(self.settings.backoff);
        }
    }

    fn start(&self, file: ReportFile) -> ReportState {
        let prev_len = fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0);
        debug!(path = %file.path.display(), dialect = %self.dialect, "processing report");
        ReportState {
            parser: self.factory.create_in(self.settings.base_dir.as_deref()),
            file,
            emitted: 0,
            prev_len,
            retries: 0,
        }
    }

    fn attempt(&mut self, state: &mut ReportState) -> Attempt {
        let bytes = match fs::read(&state.file.path) {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Unreadable(e),
        };
        let snapshot = Snapshot::new(&state.file.path, &bytes);
        match state.parser.parse(&snapshot, state.emitted, &mut self.sink) {
            ParseOutcome::Incomplete { emitted } => {
                state.emitted = state.emitted.max(emitted);
                let len = bytes.len() as u64;
                if len > state.prev_len {
                    state.prev_len = len;
                    state.retries = 0;
                } else {
                    state.retries += 1;
                }
                debug!(
                    path = %state.file.path.display(),
                    emitted = state.emitted,
                    retries = state.retries,
                    "report is incomplete"
                );
                Attempt::Incomplete
            }
            ParseOutcome::Done(result) => Attempt::Done(result),
            ParseOutcome::Failed(err) => Attempt::Failed(err),
        }
    }

    fn final_attempt(&mut self, mut state: ReportState) {
        match self.attempt(&mut state) {
            Attempt::Incomplete => self.abandon(state),
            terminal => self.conclude(state, terminal),
        }
    }

    fn conclude(&mut self, state: ReportState, attempt: Attempt) {
        let waited = state.file.discovered_at.elapsed().unwrap_or_default();
        debug!(
            path = %state.file.path.display(),
            waited_ms = waited.as_millis() as u64,
            "report reached a final state"
        );
        let path = state.file.path;
        match attempt {
            Attempt::Done(result) => {
                info!("{}", processed_message(&path, &result));
                self.summary.files_done += 1;
                self.summary.totals.accumulate(&result);
            }
            Attempt::Failed(ParseError::UnexpectedRoot { expected, .. }) => {
                self.sink.error(&format!(
                    "File {} doesn't match the expected format: {expected}",
                    path.display()
                ));
                self.summary.files_failed += 1;
            }
            Attempt::Failed(err) => {
                self.failed_to_parse(&path, &err.to_string());
            }
            Attempt::Unreadable(err) => {
                let err = ReportError::from(err);
                error!(path = %path.display(), error = %err, "report cannot be read");
                self.failed_to_parse(&path, &err.to_string());
            }
            Attempt::Incomplete => {}
        }
        self.finished.insert(path);
    }

    fn failed_to_parse(&mut self, path: &Path, reason: &str) {
        self.sink.error(&format!(
            "Failed to parse {} with {} parser: {reason}",
            path.display(),
            self.dialect
        ));
        self.summary.files_failed += 1;
    }

    /// Close whatever the parser left open and stop tracking the report.
    fn abandon(&mut self, mut state: ReportState) {
        let path = state.file.path;
        state.parser.abnormal_end(&mut self.sink);
        let reason = ReportError::Abandoned {
            path: path.clone(),
            retries: state.retries,
        };
        warn!(path = %path.display(), retries = state.retries, "{reason}");
        self.sink.warning(&format!(
            "{} report is incomplete: {} parser stopped waiting for it to be written",
            path.display(),
            self.dialect
        ));
        self.summary.files_abandoned += 1;
        self.summary.totals.accumulate(&state.parser.parsing_result());
        self.finished.insert(path);
    }
}

impl<S: ReportingSink + Send + 'static> ReportProcessor<S> {
    /// Run the processor on its own thread.
    pub fn spawn(mut self, stop: Arc<AtomicBool>) -> Result<JoinHandle<(RunSummary, S)>> {
        thread::Builder::new()
            .name("report-processor".into())
            .spawn(move || {
                self.run(&stop);
                self.into_parts()
            })
            .map_err(ReportError::from)
    }
}
