//! Ant JUnit XML reports, also written by Maven Surefire and Google Test.

use crate::duration::parse_seconds;
use crate::sink::{ReportEvent, TestFailure, TestRecord, join_type_and_message};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::text::qualified_name;
use super::{Dialect, Walk};

const EXECUTED_STATUSES: [&str; 6] = ["run", "passed", "success", "failure", "failed", "error"];

/// Ant JUnit dialect state: the test case being assembled
#[derive(Debug, Default)]
pub struct JUnit {
    test: Option<TestRecord>,
}

type W = Walk<JUnit>;

impl Dialect for JUnit {
    const TOOL: &'static str = "Ant JUnit Task";
    const EXPECTED_ROOT: &'static str = "\"testsuites\" or \"testsuite\" root element expected";

    fn rules() -> Vec<Rule<W>> {
        vec![
            Rule::element("testsuite", suite),
            Rule::path(&["testsuites", "testsuite"], suite),
        ]
    }
}

fn suite(w: &mut W, el: &ElementCursor) -> Visit<W> {
    let name = match (el.attr("name"), el.attr("package")) {
        (Some(name), Some(pack)) if !name.starts_with(pack) => Some(format!("{pack}.{name}")),
        (Some(name), _) => Some(name.to_string()),
        (None, _) => None,
    };

    let Some(name) = name else {
        let file = w.file.clone();
        w.out
            .message(ReportEvent::warning(format!("File {file} contains unnamed suite")));
        return Visit::children(suite_content(None));
    };

    w.out.suite_found(&name);
    let closing = name.clone();
    Visit::children_then(suite_content(Some(name)), move |w: &mut W| {
        w.out.suite_finished(&closing)
    })
}

fn suite_content(name: Option<String>) -> Vec<Rule<W>> {
    let failure_of = name.clone();
    let error_of = name.clone();
    let out_of = name.clone();
    let err_of = name;

    vec![
        Rule::element("failure", move |_: &mut W, el: &ElementCursor| {
            suite_problem(failure_of.clone(), "Failure", el)
        }),
        Rule::element("error", move |_: &mut W, el: &ElementCursor| suite_problem(error_of.clone(), "Error", el)),
        Rule::text(&["system-out"], move |w: &mut W, text| {
            let text = text.trim();
            match &out_of {
                Some(suite) if w.out.is_current(suite) && !text.is_empty() => w.out.message(
                    ReportEvent::info(format!("System out from suite {suite}: {text}")),
                ),
                _ => {}
            }
        }),
        Rule::text(&["system-err"], move |w: &mut W, text| {
            let text = text.trim();
            match &err_of {
                Some(suite) if w.out.is_current(suite) && !text.is_empty() => w.out.message(
                    ReportEvent::warning(format!("System error from suite {suite}: {text}")),
                ),
                _ => {}
            }
        }),
        Rule::element("testcase", test_case),
        Rule::element("testsuite", suite),
    ]
}

fn suite_problem(suite: Option<String>, label: &'static str, el: &ElementCursor) -> Visit<W> {
    let Some(suite) = suite else {
        return Visit::skip();
    };
    let kind = el.attr_owned("type");
    let message = el.attr_owned("message");
    Visit::text(move |w: &mut W, text| {
        let trace = text.trim().to_string();
        let summary = join_type_and_message(kind.as_deref(), message.as_deref());
        let report = format!("{label} from suite {suite}: {summary}\n{trace}");
        let failure = TestFailure {
            kind,
            message,
            stack_trace: Some(trace),
        };
        w.out.suite_failure(&suite, failure, report);
    })
}

fn is_executed(el: &ElementCursor) -> bool {
    if el.attr("executed").is_some() {
        return el.attr_bool("executed");
    }
    match el.attr("status").map(str::trim).filter(|s| !s.is_empty()) {
        None => true,
        Some(status) => EXECUTED_STATUSES.contains(&status.to_lowercase().as_str()),
    }
}

fn test_case(w: &mut W, el: &ElementCursor) -> Visit<W> {
    w.state.test = Some(TestRecord {
        name: qualified_name(el.attr("classname"), el.attr("name")),
        duration_ms: parse_seconds(el.attr("time")),
        executed: is_executed(el),
        ..Default::default()
    });

    Visit::children_then(
        vec![
            Rule::element("failure", |w: &mut W, el: &ElementCursor| {
                if let Some(test) = w.state.test.as_mut() {
                    test.executed = true;
                }
                test_failure(w, el)
            }),
            Rule::element("error", test_failure),
            Rule::text(&["system-out"], |w: &mut W, text| {
                if let Some(test) = w.state.test.as_mut() {
                    test.stdout = Some(text.trim().to_string());
                }
            }),
            Rule::text(&["system-err"], |w: &mut W, text| {
                if let Some(test) = w.state.test.as_mut() {
                    test.stderr = Some(text.trim().to_string());
                }
            }),
            Rule::element("skipped", |w: &mut W, _: &ElementCursor| {
                if let Some(test) = w.state.test.as_mut() {
                    test.executed = false;
                }
                Visit::skip()
            }),
            Rule::text(&["time"], |w: &mut W, text| {
                if let Some(test) = w.state.test.as_mut() {
                    test.duration_ms = parse_seconds(Some(text.trim()));
                }
            }),
        ],
        |w: &mut W| {
            if let Some(test) = w.state.test.take() {
                test_found(w, test);
            }
        },
    )
}

/// Only the first failure or error of a test is kept.
fn test_failure(w: &mut W, el: &ElementCursor) -> Visit<W> {
    let Some(test) = w.state.test.as_mut() else {
        return Visit::skip();
    };
    if test
        .failure
        .as_ref()
        .is_some_and(|f| f.kind.is_some() || f.message.is_some())
    {
        return Visit::skip();
    }
    test.failure = Some(TestFailure {
        kind: el.attr_owned("type"),
        message: el.attr_owned("message"),
        stack_trace: None,
    });
    Visit::text(|w: &mut W, text| {
        if let Some(failure) = w.state.test.as_mut().and_then(|t| t.failure.as_mut()) {
            failure.stack_trace = Some(text.trim().to_string());
        }
    })
}

fn test_found(w: &mut W, test: TestRecord) {
    let Some(name) = test.name else {
        let file = w.file.clone();
        w.out.test([ReportEvent::warning(format!(
            "File {file} contains unnamed test"
        ))]);
        return;
    };

    let mut events = vec![ReportEvent::TestStarted { name: name.clone() }];
    if !test.executed {
        events.push(ReportEvent::TestIgnored {
            name: name.clone(),
            message: String::new(),
        });
    }
    if let Some(failure) = test
        .failure
        .filter(|f| f.kind.is_some() || f.message.is_some())
    {
        events.push(ReportEvent::TestFailed {
            name: name.clone(),
            message: failure.summary(),
            stack_trace: failure.stack_trace,
        });
    }
    if let Some(stderr) = test.stderr.filter(|s| !s.is_empty()) {
        events.push(ReportEvent::warning(format!(
            "System error from test {name}: {stderr}"
        )));
    }
    if let Some(stdout) = test.stdout.filter(|s| !s.is_empty()) {
        events.push(ReportEvent::TestStdOut {
            name: name.clone(),
            text: stdout,
        });
    }
    events.push(ReportEvent::TestFinished {
        name,
        duration_ms: test.duration_ms,
    });
    w.out.test(events);
}
