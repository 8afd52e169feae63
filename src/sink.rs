//! Normalized report records and the consumer interface they are delivered to.

use std::io::Write;

use serde::Serialize;
use tracing::{error, info, warn};

/// Severity of an inspection finding, derived from the dialect priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Priority 1 is an error, 2 a warning and anything else informational.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            1 => Severity::Error,
            2 => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// Failure attached to a test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestFailure {
    pub kind: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
}

impl TestFailure {
    /// `type: message`, or whichever of the two is present
    pub fn summary(&self) -> String {
        join_type_and_message(self.kind.as_deref(), self.message.as_deref())
    }
}

pub(crate) fn join_type_and_message(kind: Option<&str>, message: Option<&str>) -> String {
    match (kind, message) {
        (Some(kind), Some(message)) if !kind.is_empty() => format!("{kind}: {message}"),
        (Some(kind), None) => kind.to_string(),
        (_, Some(message)) => message.to_string(),
        (None, None) => String::new(),
    }
}

/// One test case as assembled from a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    pub name: Option<String>,
    pub duration_ms: u64,
    pub executed: bool,
    pub failure: Option<TestFailure>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Default for TestRecord {
    fn default() -> Self {
        Self {
            name: None,
            duration_ms: 0,
            executed: true,
            failure: None,
            stdout: None,
            stderr: None,
        }
    }
}

/// One open test suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteRecord {
    pub name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub failure: Option<TestFailure>,
}

impl SuiteRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: chrono::Utc::now(),
            failure: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (chrono::Utc::now() - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Static description of an inspection kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionFinding {
    pub inspection_id: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub priority: u8,
}

impl InspectionFinding {
    pub fn severity(&self) -> Severity {
        Severity::from_priority(self.priority)
    }
}

/// One location of a duplicated code fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentLocation {
    pub file: String,
    pub line: u32,
    pub hash: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFragment {
    pub hash: i32,
    pub tokens: u32,
    pub lines: u32,
    pub locations: Vec<FragmentLocation>,
}

/// Consumer of normalized report events
pub trait ReportingSink {
    fn open_test_suite(&mut self, name: &str);
    fn close_test_suite(&mut self, name: &str);
    fn open_test(&mut self, name: &str);
    fn close_test(&mut self, name: &str, duration_ms: u64);
    fn test_fail(&mut self, name: &str, message: &str, stack_trace: Option<&str>);
    fn test_ignored(&mut self, name: &str, message: &str);
    fn test_std_output(&mut self, name: &str, text: &str);
    fn test_err_output(&mut self, name: &str, text: &str);
    fn report_inspection_type(&mut self, inspection_type: &InspectionType);
    fn report_inspection(&mut self, finding: &InspectionFinding);
    fn start_duplicates(&mut self);
    fn report_duplicate(&mut self, duplicate: &DuplicateFragment);
    fn finish_duplicates(&mut self);
    fn warning(&mut self, message: &str);
    fn error(&mut self, message: &str);
    fn info(&mut self, message: &str);
}

/// A sink call captured as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ReportEvent {
    SuiteStarted { name: String },
    SuiteFinished { name: String },
    TestStarted { name: String },
    TestFinished { name: String, duration_ms: u64 },
    TestFailed {
        name: String,
        message: String,
        stack_trace: Option<String>,
    },
    TestIgnored { name: String, message: String },
    TestStdOut { name: String, text: String },
    TestStdErr { name: String, text: String },
    InspectionType(InspectionType),
    Inspection(InspectionFinding),
    DuplicatesStarted,
    Duplicate(DuplicateFragment),
    DuplicatesFinished,
    Warning { message: String },
    Error { message: String },
    Info { message: String },
}

impl ReportEvent {
    /// Deliver this event to `sink`.
    pub fn dispatch(&self, sink: &mut dyn ReportingSink) {
        match self {
            ReportEvent::SuiteStarted { name } => sink.open_test_suite(name),
            ReportEvent::SuiteFinished { name } => sink.close_test_suite(name),
            ReportEvent::TestStarted { name } => sink.open_test(name),
            ReportEvent::TestFinished { name, duration_ms } => sink.close_test(name, *duration_ms),
            ReportEvent::TestFailed {
                name,
                message,
                stack_trace,
            } => sink.test_fail(name, message, stack_trace.as_deref()),
            ReportEvent::TestIgnored { name, message } => sink.test_ignored(name, message),
            ReportEvent::TestStdOut { name, text } => sink.test_std_output(name, text),
            ReportEvent::TestStdErr { name, text } => sink.test_err_output(name, text),
            ReportEvent::InspectionType(inspection_type) => {
                sink.report_inspection_type(inspection_type)
            }
            ReportEvent::Inspection(finding) => sink.report_inspection(finding),
            ReportEvent::DuplicatesStarted => sink.start_duplicates(),
            ReportEvent::Duplicate(duplicate) => sink.report_duplicate(duplicate),
            ReportEvent::DuplicatesFinished => sink.finish_duplicates(),
            ReportEvent::Warning { message } => sink.warning(message),
            ReportEvent::Error { message } => sink.error(message),
            ReportEvent::Info { message } => sink.info(message),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        ReportEvent::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ReportEvent::Error {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        ReportEvent::Info {
            message: message.into(),
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<ReportEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<ReportEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, predicate: impl Fn(&ReportEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(*e)).count()
    }

    /// Names of the tests opened so far, in order
    pub fn started_tests(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ReportEvent::TestStarted { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ReportingSink for RecordingSink {
    fn open_test_suite(&mut self, name: &str) {
        self.events.push(ReportEvent::SuiteStarted { name: name.into() });
    }

    fn close_test_suite(&mut self, name: &str) {
        self.events.push(ReportEvent::SuiteFinished { name: name.into() });
    }

    fn open_test(&mut self, name: &str) {
        self.events.push(ReportEvent::TestStarted { name: name.into() });
    }

    fn close_test(&mut self, name: &str, duration_ms: u64) {
        self.events.push(ReportEvent::TestFinished {
            name: name.into(),
            duration_ms,
        });
    }

    fn test_fail(&mut self, name: &str, message: &str, stack_trace: Option<&str>) {
        self.events.push(ReportEvent::TestFailed {
            name: name.into(),
            message: message.into(),
            stack_trace: stack_trace.map(str::to_string),
        });
    }

    fn test_ignored(&mut self, name: &str, message: &str) {
        self.events.push(ReportEvent::TestIgnored {
            name: name.into(),
            message: message.into(),
        });
    }

    fn test_std_output(&mut self, name: &str, text: &str) {
        self.events.push(ReportEvent::TestStdOut {
            name: name.into(),
            text: text.into(),
        });
    }

    fn test_err_output(&mut self, name: &str, text: &str) {
        self.events.push(ReportEvent::TestStdErr {
            name: name.into(),
            text: text.into(),
        });
    }

    fn report_inspection_type(&mut self, inspection_type: &InspectionType) {
        self.events
            .push(ReportEvent::InspectionType(inspection_type.clone()));
    }

    fn report_inspection(&mut self, finding: &InspectionFinding) {
        self.events.push(ReportEvent::Inspection(finding.clone()));
    }

    fn start_duplicates(&mut self) {
        self.events.push(ReportEvent::DuplicatesStarted);
    }

    fn report_duplicate(&mut self, duplicate: &DuplicateFragment) {
        self.events.push(ReportEvent::Duplicate(duplicate.clone()));
    }

    fn finish_duplicates(&mut self) {
        self.events.push(ReportEvent::DuplicatesFinished);
    }

    fn warning(&mut self, message: &str) {
        self.events.push(ReportEvent::warning(message));
    }

    fn error(&mut self, message: &str) {
        self.events.push(ReportEvent::error(message));
    }

    fn info(&mut self, message: &str) {
        self.events.push(ReportEvent::info(message));
    }
}

/// Sink that renders events as `tracing` records under the `report` target
#[derive(Debug, Default)]
pub struct LoggingSink;

impl ReportingSink for LoggingSink {
    fn open_test_suite(&mut self, name: &str) {
        info!(target: "report", suite = name, "suite started");
    }

    fn close_test_suite(&mut self, name: &str) {
        info!(target: "report", suite = name, "suite finished");
    }

    fn open_test(&mut self, name: &str) {
        info!(target: "report", test = name, "test started");
    }

    fn close_test(&mut self, name: &str, duration_ms: u64) {
        info!(target: "report", test = name, duration_ms, "test finished");
    }

    fn test_fail(&mut self, name: &str, message: &str, stack_trace: Option<&str>) {
        error!(
            target: "report",
            test = name,
            stack_trace = stack_trace.unwrap_or_default(),
            "test failed: {message}"
        );
    }

    fn test_ignored(&mut self, name: &str, message: &str) {
        warn!(target: "report", test = name, "test ignored: {message}");
    }

    fn test_std_output(&mut self, name: &str, text: &str) {
        info!(target: "report", test = name, "stdout: {text}");
    }

    fn test_err_output(&mut self, name: &str, text: &str) {
        warn!(target: "report", test = name, "stderr: {text}");
    }

    fn report_inspection_type(&mut self, inspection_type: &InspectionType) {
        info!(
            target: "report",
            id = %inspection_type.id,
            category = %inspection_type.category,
            "inspection type {}",
            inspection_type.name
        );
    }

    fn report_inspection(&mut self, finding: &InspectionFinding) {
        let location = format!("{}:{}", finding.file, finding.line);
        match finding.severity() {
            Severity::Error => error!(target: "report", id = %finding.inspection_id, %location, "{}", finding.message),
            Severity::Warning => warn!(target: "report", id = %finding.inspection_id, %location, "{}", finding.message),
            Severity::Info => info!(target: "report", id = %finding.inspection_id, %location, "{}", finding.message),
        }
    }

    fn start_duplicates(&mut self) {
        info!(target: "report", "duplicates started");
    }

    fn report_duplicate(&mut self, duplicate: &DuplicateFragment) {
        let locations: Vec<String> = duplicate
            .locations
            .iter()
            .map(|l| format!("{}:{}", l.file, l.line))
            .collect();
        warn!(
            target: "report",
            lines = duplicate.lines,
            tokens = duplicate.tokens,
            "duplicate fragment at {}",
            locations.join(", ")
        );
    }

    fn finish_duplicates(&mut self) {
        info!(target: "report", "duplicates finished");
    }

    fn warning(&mut self, message: &str) {
        warn!(target: "report", "{message}");
    }

    fn error(&mut self, message: &str) {
        error!(target: "report", "{message}");
    }

    fn info(&mut self, message: &str) {
        info!(target: "report", "{message}");
    }
}

/// Sink that writes one JSON object per event
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: ReportEvent) {
        let written = serde_json::to_string(&event)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.out, "{line}"));
        if let Err(e) = written {
            error!(error = %e, "failed to write report event");
        }
    }
}

impl<W: Write> ReportingSink for JsonLinesSink<W> {
    fn open_test_suite(&mut self, name: &str) {
        self.emit(ReportEvent::SuiteStarted { name: name.into() });
    }

    fn close_test_suite(&mut self, name: &str) {
        self.emit(ReportEvent::SuiteFinished { name: name.into() });
    }

    fn open_test(&mut self, name: &str) {
        self.emit(ReportEvent::TestStarted { name: name.into() });
    }

    fn close_test(&mut self, name: &str, duration_ms: u64) {
        self.emit(ReportEvent::TestFinished {
            name: name.into(),
            duration_ms,
        });
    }

    fn test_fail(&mut self, name: &str, message: &str, stack_trace: Option<&str>) {
        self.emit(ReportEvent::TestFailed {
            name: name.into(),
            message: message.into(),
            stack_trace: stack_trace.map(str::to_string),
        });
    }

    fn test_ignored(&mut self, name: &str, message: &str) {
        self.emit(ReportEvent::TestIgnored {
            name: name.into(),
            message: message.into(),
        });
    }

    fn test_std_output(&mut self, name: &str, text: &str) {
        self.emit(ReportEvent::TestStdOut {
            name: name.into(),
            text: text.into(),
        });
    }

    fn test_err_output(&mut self, name: &str, text: &str) {
        self.emit(ReportEvent::TestStdErr {
            name: name.into(),
            text: text.into(),
        });
    }

    fn report_inspection_type(&mut self, inspection_type: &InspectionType) {
        self.emit(ReportEvent::InspectionType(inspection_type.clone()));
    }

    fn report_inspection(&mut self, finding: &InspectionFinding) {
        self.emit(ReportEvent::Inspection(finding.clone()));
    }

    fn start_duplicates(&mut self) {
        self.emit(ReportEvent::DuplicatesStarted);
    }

    fn report_duplicate(&mut self, duplicate: &DuplicateFragment) {
        self.emit(ReportEvent::Duplicate(duplicate.clone()));
    }

    fn finish_duplicates(&mut self) {
        self.emit(ReportEvent::DuplicatesFinished);
    }

    fn warning(&mut self, message: &str) {
        self.emit(ReportEvent::warning(message));
    }

    fn error(&mut self, message: &str) {
        self.emit(ReportEvent::error(message));
    }

    fn info(&mut self, message: &str) {
        self.emit(ReportEvent::info(message));
    }
}

impl<S: ReportingSink + ?Sized> ReportingSink for Box<S> {
    fn open_test_suite(&mut self, name: &str) {
        (**self).open_test_suite(name)
    }

    fn close_test_suite(&mut self, name: &str) {
        (**self).close_test_suite(name)
    }

    fn open_test(&mut self, name: &str) {
        (**self).open_test(name)
    }

    fn close_test(&mut self, name: &str, duration_ms: u64) {
        (**self).close_test(name, duration_ms)
    }

    fn test_fail(&mut self, name: &str, message: &str, stack_trace: Option<&str>) {
        (**self).test_fail(name, message, stack_trace)
    }

    fn test_ignored(&mut self, name: &str, message: &str) {
        (**self).test_ignored(name, message)
    }

    fn test_std_output(&mut self, name: &str, text: &str) {
        (**self).test_std_output(name, text)
    }

    fn test_err_output(&mut self, name: &str, text: &str) {
        (**self).test_err_output(name, text)
    }

    fn report_inspection_type(&mut self, inspection_type: &InspectionType) {
        (**self).report_inspection_type(inspection_type)
    }

    fn report_inspection(&mut self, finding: &InspectionFinding) {
        (**self).report_inspection(finding)
    }

    fn start_duplicates(&mut self) {
        (**self).start_duplicates()
    }

    fn report_duplicate(&mut self, duplicate: &DuplicateFragment) {
        (**self).report_duplicate(duplicate)
    }

    fn finish_duplicates(&mut self) {
        (**self).finish_duplicates()
    }

    fn warning(&mut self, message: &str) {
        (**self).warning(message)
    }

    fn error(&mut self, message: &str) {
        (**self).error(message)
    }

    fn info(&mut self, message: &str) {
        (**self).info(message)
    }
}
