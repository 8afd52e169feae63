use std::fs;
use std::thread;
use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use xml_report_watcher::{
    JsonLinesSink, ParserRegistry, RecordingSink, ReportEvent, RootStatus, WatchSession,
};

use crate::common::test_helpers::{
    GrowingReport, JUNIT_REPORT, TestFixtures, assert_duration_within_bounds, parse_in_steps,
    quick_config,
};

fn session(config: xml_report_watcher::Config) -> WatchSession {
    WatchSession::new(config, &ParserRegistry::with_builtin())
        .unwrap()
        .with_build_start(SystemTime::UNIX_EPOCH)
}

#[test]
fn test_growing_report_is_followed_to_the_end() {
    let dir = TempDir::new().unwrap();
    let mut config = quick_config(dir.path(), "junit");
    config.processing.retry_budget = 200;

    let path = dir.path().join("TEST-growing.xml");
    let cut = JUNIT_REPORT.find("<testsuite name=\"com.example.SecondTest\"").unwrap();
    let (report, mut sink) = session(config)
        .run(RecordingSink::new(), || {
            let growing = GrowingReport::create(&path);
            growing.append(&JUNIT_REPORT[..cut]);
            thread::sleep(Duration::from_millis(300));
            growing.append(&JUNIT_REPORT[cut..]);
            thread::sleep(Duration::from_millis(100));
        })
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.files_done, 1);
    assert_eq!(report.summary.totals.suites, 2);
    assert_eq!(report.summary.totals.tests, 4);
    assert_eq!(sink.take(), parse_in_steps("junit", JUNIT_REPORT, &[]).events);
}

#[test]
fn test_frozen_report_is_abandoned_once() {
    let dir = TempDir::new().unwrap();
    let config = quick_config(dir.path(), "junit");
    let path = dir.path().join("TEST-frozen.xml");

    let (report, sink) = session(config)
        .run(RecordingSink::new(), || {
            fs::write(
                &path,
                r#"<testsuite name="Frozen"><testcase name="only" time="0.5"/>"#,
            )
            .unwrap();
            thread::sleep(Duration::from_millis(400));
        })
        .unwrap();

    assert_eq!(report.summary.files_abandoned, 1);
    assert_eq!(report.summary.files_done, 0);
    assert_eq!(report.summary.totals.tests, 1);
    assert!(report.is_success());

    assert_eq!(sink.started_tests(), vec!["only"]);
    assert_eq!(
        sink.count(|e| matches!(e, ReportEvent::SuiteFinished { name } if name == "Frozen")),
        1
    );
    let warning = format!(
        "{} report is incomplete: junit parser stopped waiting for it to be written",
        path.display()
    );
    assert_eq!(sink.count(|e| *e == ReportEvent::warning(warning.as_str())), 1);
}

#[test]
fn test_report_in_wrong_format_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let fixtures = TestFixtures::new();
    fs::copy(fixtures.junit_report(), dir.path().join("results.trx")).unwrap();

    let mut config = quick_config(dir.path(), "mstest");
    config.watch.extensions = vec!["trx".to_string()];
    let (report, sink) = session(config).run(RecordingSink::new(), || {}).unwrap();

    assert_eq!(report.summary.files_failed, 1);
    assert!(!report.is_success());
    assert_eq!(
        sink.count(|e| matches!(e, ReportEvent::Error { message } if message.contains("doesn't match the expected format"))),
        1
    );
}

#[test]
fn test_several_roots_and_their_statuses() {
    let reports = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    let unmatched = TempDir::new().unwrap();
    let missing = reports.path().join("not-there");
    let fixtures = TestFixtures::new();

    fs::copy(fixtures.junit_report(), reports.path().join("TEST-calc.xml")).unwrap();
    fs::write(reports.path().join("notes.txt"), "not a report").unwrap();
    fs::write(unmatched.path().join("build.log"), "compiling").unwrap();

    let mut config = quick_config(reports.path(), "junit");
    config.watch.roots.extend([
        empty.path().to_path_buf(),
        unmatched.path().to_path_buf(),
        missing.clone(),
    ]);
    let (report, sink) = session(config).run(RecordingSink::new(), || {}).unwrap();

    assert_eq!(report.summary.files_done, 1);
    assert_eq!(report.watch.enqueued, 1);
    assert!(report.watch.scans >= 1);
    assert_eq!(
        report.watch.roots,
        vec![
            (reports.path().to_path_buf(), RootStatus::Active),
            (empty.path().to_path_buf(), RootStatus::Empty),
            (unmatched.path().to_path_buf(), RootStatus::NoMatchingFiles),
            (missing, RootStatus::Missing),
        ]
    );
    assert_eq!(sink.started_tests().len(), 3);
}

#[test]
fn test_reports_older_than_the_build_are_ignored() {
    let dir = TempDir::new().unwrap();
    let fixtures = TestFixtures::new();
    fs::copy(fixtures.junit_report(), dir.path().join("TEST-old.xml")).unwrap();
    thread::sleep(Duration::from_millis(50));

    let mut config = quick_config(dir.path(), "junit");
    config.watch.build_start = Some(chrono::Utc::now() + chrono::Duration::seconds(5));
    let registry = ParserRegistry::with_builtin();
    let (report, sink) = WatchSession::new(config, &registry)
        .unwrap()
        .run(RecordingSink::new(), || {})
        .unwrap();

    assert_eq!(report.summary.files(), 0);
    assert!(sink.events.is_empty());
    assert_eq!(report.watch.roots[0].1, RootStatus::NoMatchingFiles);
}

#[test]
fn test_events_as_json_lines() {
    let dir = TempDir::new().unwrap();
    let fixtures = TestFixtures::new();
    fs::copy(fixtures.checkstyle_report(), dir.path().join("checkstyle-result.xml")).unwrap();

    let config = quick_config(dir.path(), "checkstyle");
    let (report, sink) = session(config).run(JsonLinesSink::new(Vec::new()), || {}).unwrap();
    assert_eq!(report.summary.totals.inspections(), 3);

    let written = String::from_utf8(sink.into_inner()).unwrap();
    let events: Vec<serde_json::Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let findings = events.iter().filter(|e| e["event"] == "inspection").count();
    assert_eq!(findings, 3);
}

#[test]
fn test_shutdown_is_bounded_by_the_final_drain() {
    let dir = TempDir::new().unwrap();
    let mut config = quick_config(dir.path(), "junit");
    config.processing.retry_budget = 10_000;
    config.processing.final_drain_ms = 100;

    let path = dir.path().join("TEST-endless.xml");
    let (report, _) = session(config)
        .run(RecordingSink::new(), || {
            fs::write(&path, r#"<testsuite name="Endless">"#).unwrap();
            thread::sleep(Duration::from_millis(100));
        })
        .unwrap();

    assert_eq!(report.summary.files_abandoned, 1);
    assert_duration_within_bounds(report.elapsed, Duration::from_millis(100), Duration::from_secs(10));
}
