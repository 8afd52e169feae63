use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::sample::Index;
use xml_report_watcher::{ParseError, ParseOutcome, ParserRegistry, RecordingSink, ReportEvent};

use crate::common::test_helpers::{JUNIT_REPORT, TestFixtures, parse_in_steps, parse_prefix};

fn started(events: &[ReportEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ReportEvent::TestStarted { name } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_report_written_in_two_steps_matches_single_parse() {
    let cut = JUNIT_REPORT.find("<testsuite name=\"com.example.SecondTest\"").unwrap();
    let whole = parse_in_steps("junit", JUNIT_REPORT, &[]);
    let stepped = parse_in_steps("junit", JUNIT_REPORT, &[cut]);

    assert_eq!(stepped.outcomes[0], ParseOutcome::Incomplete { emitted: 2 });
    assert!(matches!(stepped.outcomes[1], ParseOutcome::Done(ref r) if r.suites == 2 && r.tests == 4));
    assert_eq!(stepped.events, whole.events);
    assert_eq!(
        started(&whole.events),
        vec![
            "com.example.FirstTest.one",
            "com.example.FirstTest.two",
            "com.example.SecondTest.three",
            "com.example.SecondTest.four",
        ]
    );
}

#[test]
fn test_unchanged_snapshot_emits_nothing_new() {
    let cut = JUNIT_REPORT.find("</testsuite>").unwrap();
    let attempts = parse_in_steps("junit", JUNIT_REPORT, &[cut, cut, cut]);
    let whole = parse_in_steps("junit", JUNIT_REPORT, &[]);
    assert_eq!(attempts.outcomes.len(), 4);
    assert_eq!(attempts.outcomes[1], attempts.outcomes[2]);
    assert_eq!(attempts.events, whole.events);
}

#[test]
fn test_frozen_suite_is_closed_once() {
    let registry = ParserRegistry::with_builtin();
    let mut parser = registry.get("junit").unwrap().create();
    let mut sink = RecordingSink::new();

    let prefix = r#"<testsuite name="Frozen"><testcase name="done" time="1"/><testcase name="half""#;
    let outcome = parse_prefix(parser.as_mut(), prefix.as_bytes(), 0, &mut sink);
    assert_eq!(outcome, ParseOutcome::Incomplete { emitted: 1 });
    assert_eq!(started(&sink.events), vec!["done"]);

    parser.abnormal_end(&mut sink);
    let closed = sink.count(|e| matches!(e, ReportEvent::SuiteFinished { name } if name == "Frozen"));
    assert_eq!(closed, 1);
    assert_eq!(parser.parsing_result().tests, 1);
}

#[test]
fn test_whole_document_dialect_waits_for_the_end() {
    let fixtures = TestFixtures::new();
    let report = fixtures.read(&fixtures.checkstyle_report());
    let cut = report.find("</file>").unwrap();

    let registry = ParserRegistry::with_builtin();
    let mut parser = registry.get("checkstyle").unwrap().create();
    let mut sink = RecordingSink::new();
    let outcome = parse_prefix(parser.as_mut(), &report.as_bytes()[..cut], 0, &mut sink);
    assert_eq!(outcome, ParseOutcome::Incomplete { emitted: 0 });
    assert!(sink.events.is_empty());

    let stepped = parse_in_steps("checkstyle", &report, &[cut]);
    let whole = parse_in_steps("checkstyle", &report, &[]);
    assert_eq!(stepped.events, whole.events);
    assert_eq!(
        whole.events.iter().filter(|e| matches!(e, ReportEvent::Inspection(_))).count(),
        3
    );
}

#[test]
fn test_streaming_dialect_reports_finished_tests_early() {
    let fixtures = TestFixtures::new();
    let report = fixtures.read(&fixtures.nunit_report());
    let cut = report.find("<test-case name=\"Tests.Math.Sub\"").unwrap();

    let attempts = parse_in_steps("nunit", &report, &[cut]);
    assert_eq!(attempts.outcomes[0], ParseOutcome::Incomplete { emitted: 1 });
    assert!(matches!(attempts.outcomes[1], ParseOutcome::Done(ref r) if r.tests == 2));
    assert_eq!(started(&attempts.events), vec!["Tests.Math.Add", "Tests.Math.Sub"]);
}

#[test]
fn test_wrong_dialect_fails_without_events() {
    let fixtures = TestFixtures::new();
    let report = fixtures.read(&fixtures.junit_report());
    let attempts = parse_in_steps("mstest", &report, &[]);

    match &attempts.outcomes[0] {
        ParseOutcome::Failed(ParseError::UnexpectedRoot { found, .. }) => assert_eq!(found, "testsuite"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(attempts.events.is_empty());
}

#[test]
fn test_streaming_fixture_reports() {
    let fixtures = TestFixtures::new();
    let expected = [4, 2, 3, 3, 2];
    for ((dialect, report), tests) in fixtures.streaming_reports().iter().zip(expected) {
        let attempts = parse_in_steps(dialect, report, &[]);
        assert!(
            matches!(attempts.outcomes[0], ParseOutcome::Done(_)),
            "{dialect}: {:?}",
            attempts.outcomes[0]
        );
        assert_eq!(started(&attempts.events).len(), tests, "{dialect}");
    }
}

#[test]
fn test_fixture_reports() {
    let fixtures = TestFixtures::new();

    let junit = parse_in_steps("junit", &fixtures.read(&fixtures.junit_report()), &[]);
    assert!(matches!(junit.outcomes[0], ParseOutcome::Done(ref r) if r.suites == 1 && r.tests == 3));
    assert_eq!(
        junit.events.iter().filter(|e| matches!(e, ReportEvent::TestFailed { .. })).count(),
        1
    );
    assert_eq!(
        junit.events.iter().filter(|e| matches!(e, ReportEvent::TestIgnored { .. })).count(),
        1
    );

    let checkstyle = parse_in_steps("checkstyle", &fixtures.read(&fixtures.checkstyle_report()), &[]);
    match &checkstyle.outcomes[0] {
        ParseOutcome::Done(result) => {
            assert_eq!((result.errors, result.warnings, result.infos), (1, 1, 1));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let mstest = parse_in_steps("mstest", &fixtures.read(&fixtures.mstest_report()), &[]);
    assert!(matches!(mstest.outcomes[0], ParseOutcome::Done(ref r) if r.tests == 2));
    assert_eq!(started(&mstest.events), vec!["Tests.Calc.Adds", "Tests.Calc.Divides"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_any_truncation_point_is_tolerated(cut in 0usize..JUNIT_REPORT.len()) {
        let whole = parse_in_steps("junit", JUNIT_REPORT, &[]);
        let stepped = parse_in_steps("junit", JUNIT_REPORT, &[cut]);
        let first_incomplete = matches!(stepped.outcomes[0], ParseOutcome::Incomplete { .. });
        let then_done = matches!(stepped.outcomes[1], ParseOutcome::Done(_));
        prop_assert!(first_incomplete, "first attempt: {:?}", stepped.outcomes[0]);
        prop_assert!(then_done, "second attempt: {:?}", stepped.outcomes[1]);
        prop_assert_eq!(stepped.events, whole.events);
    }

    #[test]
    fn prop_truncated_document_yields_a_prefix_of_the_events(cut in 0usize..JUNIT_REPORT.len()) {
        let whole = parse_in_steps("junit", JUNIT_REPORT, &[]);
        let registry = ParserRegistry::with_builtin();
        let mut parser = registry.get("junit").unwrap().create();
        let mut sink = RecordingSink::new();
        parse_prefix(parser.as_mut(), &JUNIT_REPORT.as_bytes()[..cut], 0, &mut sink);

        let opened = sink.count(|e| matches!(e, ReportEvent::SuiteStarted { .. }));
        let closed = sink.count(|e| matches!(e, ReportEvent::SuiteFinished { .. }));
        prop_assert!(closed <= opened);
        prop_assert!(sink.events.len() <= whole.events.len());
        prop_assert_eq!(&sink.events[..], &whole.events[..sink.events.len()]);
    }

    #[test]
    fn prop_three_step_writes_match_single_parse(
        a in 0usize..JUNIT_REPORT.len(),
        b in 0usize..JUNIT_REPORT.len(),
    ) {
        let (first, second) = (a.min(b), a.max(b));
        let whole = parse_in_steps("junit", JUNIT_REPORT, &[]);
        let stepped = parse_in_steps("junit", JUNIT_REPORT, &[first, second]);
        prop_assert_eq!(stepped.events, whole.events);
    }

    #[test]
    fn prop_streaming_dialects_resume_after_any_cut(
        which in 0usize..5,
        a in any::<Index>(),
        b in any::<Index>(),
    ) {
        let reports = TestFixtures::new().streaming_reports();
        let (dialect, report) = &reports[which];
        let (first, second) = (a.index(report.len()), b.index(report.len()));
        let (first, second) = (first.min(second), first.max(second));

        let whole = parse_in_steps(dialect, report, &[]);
        let stepped = parse_in_steps(dialect, report, &[first, second]);
        let none_failed = stepped
            .outcomes
            .iter()
            .all(|outcome| !matches!(outcome, ParseOutcome::Failed(_)));
        prop_assert!(none_failed, "{} cut at {}/{}: {:?}", dialect, first, second, stepped.outcomes);
        prop_assert_eq!(stepped.events, whole.events);
    }

    #[test]
    fn prop_streaming_dialects_emit_a_prefix_when_truncated(
        which in 0usize..5,
        cut in any::<Index>(),
    ) {
        let reports = TestFixtures::new().streaming_reports();
        let (dialect, report) = &reports[which];
        let cut = cut.index(report.len());

        let whole = parse_in_steps(dialect, report, &[]);
        let registry = ParserRegistry::with_builtin();
        let mut parser = registry.get(dialect).unwrap().create();
        let mut sink = RecordingSink::new();
        let outcome = parse_prefix(parser.as_mut(), &report.as_bytes()[..cut], 0, &mut sink);

        let incomplete = matches!(outcome, ParseOutcome::Incomplete { .. });
        prop_assert!(incomplete, "{} cut at {}: {:?}", dialect, cut, outcome);
        prop_assert!(sink.events.len() <= whole.events.len());
        prop_assert_eq!(&sink.events[..], &whole.events[..sink.events.len()]);
    }
}
