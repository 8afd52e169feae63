use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use xml_report_watcher::{Config, FormatParser, ParseOutcome, ParserRegistry, RecordingSink, ReportEvent, Snapshot};

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn junit_report(&self) -> PathBuf {
        self.fixtures_dir.join("junit").join("TEST-com.example.CalcTest.xml")
    }

    pub fn nunit_report(&self) -> PathBuf {
        self.fixtures_dir.join("nunit").join("TestResult.xml")
    }

    pub fn checkstyle_report(&self) -> PathBuf {
        self.fixtures_dir.join("checkstyle").join("checkstyle-result.xml")
    }

    pub fn mstest_report(&self) -> PathBuf {
        self.fixtures_dir.join("mstest").join("results.trx")
    }

    pub fn nunit3_report(&self) -> PathBuf {
        self.fixtures_dir.join("nunit3").join("TestResult.xml")
    }

    pub fn testng_report(&self) -> PathBuf {
        self.fixtures_dir.join("testng").join("testng-results.xml")
    }

    pub fn ctest_report(&self) -> PathBuf {
        self.fixtures_dir.join("ctest").join("Test.xml")
    }

    /// Reports of every dialect that emits tests before the document is
    /// complete, trailing whitespace removed so any shorter prefix is truncated.
    pub fn streaming_reports(&self) -> Vec<(&'static str, String)> {
        vec![
            ("junit", JUNIT_REPORT.to_string()),
            ("nunit", self.read(&self.nunit_report())),
            ("nunit", self.read(&self.nunit3_report())),
            ("testng", self.read(&self.testng_report())),
            ("ctest", self.read(&self.ctest_report())),
        ]
        .into_iter()
        .map(|(dialect, report)| (dialect, report.trim_end().to_string()))
        .collect()
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }
}

/// A report file written in several steps, the way a test runner flushes it
pub struct GrowingReport {
    path: PathBuf,
}

impl GrowingReport {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        fs::write(&path, "").unwrap();
        Self { path }
    }

    pub fn append(&self, chunk: &str) {
        let mut file = OpenOptions::new().append(true).open(&self.path).unwrap();
        file.write_all(chunk.as_bytes()).unwrap();
        file.flush().unwrap();
    }
}

/// Result of feeding one parser a sequence of growing snapshots
pub struct Attempts {
    pub outcomes: Vec<ParseOutcome>,
    pub events: Vec<ReportEvent>,
}

/// Parse each prefix of `content` in turn with one parser, threading the
/// emitted count through the attempts the way the processor does.
pub fn parse_in_steps(dialect: &str, content: &str, cuts: &[usize]) -> Attempts {
    let registry = ParserRegistry::with_builtin();
    let mut parser = registry.get(dialect).unwrap().create();
    let mut sink = RecordingSink::new();
    let mut outcomes = Vec::new();
    let mut emitted = 0;

    for cut in cuts.iter().copied().chain([content.len()]) {
        let outcome = parse_prefix(parser.as_mut(), &content.as_bytes()[..cut], emitted, &mut sink);
        if let ParseOutcome::Incomplete { emitted: now } = outcome {
            emitted = now;
        }
        outcomes.push(outcome);
    }

    Attempts {
        outcomes,
        events: sink.take(),
    }
}

pub fn parse_prefix(
    parser: &mut dyn FormatParser,
    bytes: &[u8],
    emitted: usize,
    sink: &mut RecordingSink,
) -> ParseOutcome {
    parser.parse(&Snapshot::new(Path::new("report.xml"), bytes), emitted, sink)
}

/// Config for tests: short timings and a single watched root
pub fn quick_config(root: &Path, dialect: &str) -> Config {
    let mut config = Config::default();
    config.watch.roots = vec![root.to_path_buf()];
    config.watch.dialect = dialect.to_string();
    config.watch.scan_interval_ms = 10;
    config.processing.backoff_ms = 10;
    config.processing.poll_timeout_ms = 20;
    config.processing.final_drain_ms = 500;
    config.processing.retry_budget = 5;
    config
}

/// Assert that a duration is within expected bounds
pub fn assert_duration_within_bounds(actual: Duration, min: Duration, max: Duration) {
    assert!(
        actual >= min && actual <= max,
        "Duration {:?} not within bounds [{:?}, {:?}]",
        actual,
        min,
        max
    );
}

pub const JUNIT_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="com.example.FirstTest" time="0.3">
    <testcase classname="com.example.FirstTest" name="one" time="0.1"/>
    <testcase classname="com.example.FirstTest" name="two" time="0.2">
      <failure message="expected 1 but was 2">at FirstTest.two(FirstTest.java:20)</failure>
    </testcase>
  </testsuite>
  <testsuite name="com.example.SecondTest" time="0.05">
    <testcase classname="com.example.SecondTest" name="three" time="0.05">
      <system-out>three says hi</system-out>
    </testcase>
    <testcase classname="com.example.SecondTest" name="four"><skipped/></testcase>
  </testsuite>
</testsuites>"#;
