//! Visual Studio test results (`.trx`), as written by MSTest and VSTest.
//!
//! The test names live in a definitions table that may follow the results,
//! so a report is only read once it is complete: one pass collects the
//! names, a second one reports the results.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::LazyLock;

use crate::duration::{parse_clock, parse_timestamp_delta};
use crate::sink::ReportEvent;
use crate::xml_visitor::{self, ElementCursor, ElementPattern, Outcome, Rule, Visit};

use super::text::is_blank;
use super::{Dialect, ParsingResult, Walk};

/// Name of the suite that wraps every test of the report
pub trait TrxFlavor: Default + std::fmt::Debug + 'static {
    const SUITE: &'static str;
}

#[derive(Debug, Default)]
pub struct TrxSuite;

impl TrxFlavor for TrxSuite {
    const SUITE: &'static str = "TRX";
}

#[derive(Debug, Default)]
pub struct MsTest;

impl TrxFlavor for MsTest {
    const SUITE: &'static str = "MSTest";
}

#[derive(Debug, Default)]
pub struct VsTest;

impl TrxFlavor for VsTest {
    const SUITE: &'static str = "VSTest";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Passed,
    Failed,
    Ignored,
}

/// TRX test outcome: name, VS2005 numeric value and reporting status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TestOutcome {
    name: &'static str,
    value: Option<i64>,
    status: Status,
}

const OUTCOMES: [TestOutcome; 14] = [
    TestOutcome { name: "Aborted", value: Some(3), status: Status::Failed },
    TestOutcome { name: "Completed", value: Some(11), status: Status::Passed },
    TestOutcome { name: "Disconnected", value: Some(8), status: Status::Passed },
    TestOutcome { name: "Error", value: Some(0), status: Status::Failed },
    TestOutcome { name: "Failed", value: Some(1), status: Status::Failed },
    TestOutcome { name: "Inconclusive", value: Some(4), status: Status::Ignored },
    TestOutcome { name: "InProgress", value: Some(12), status: Status::Ignored },
    TestOutcome { name: "NotExecuted", value: Some(7), status: Status::Ignored },
    TestOutcome { name: "NotRunnable", value: Some(6), status: Status::Ignored },
    TestOutcome { name: "Passed", value: Some(10), status: Status::Passed },
    TestOutcome { name: "PassedButRunAborted", value: Some(5), status: Status::Passed },
    TestOutcome { name: "Pending", value: Some(13), status: Status::Ignored },
    TestOutcome { name: "Timeout", value: Some(2), status: Status::Failed },
    TestOutcome { name: "Warning", value: Some(9), status: Status::Passed },
];

const UNKNOWN: TestOutcome = TestOutcome {
    name: "__UNKNOWN__",
    value: None,
    status: Status::Failed,
};

impl TestOutcome {
    fn by_name(name: &str) -> Self {
        OUTCOMES
            .iter()
            .copied()
            .find(|o| o.name.eq_ignore_ascii_case(name.trim()))
            .unwrap_or(UNKNOWN)
    }

    fn by_value(value: &str) -> Self {
        let Ok(value) = value.trim().parse::<i64>() else {
            return UNKNOWN;
        };
        OUTCOMES
            .iter()
            .copied()
            .find(|o| o.value == Some(value))
            .unwrap_or(UNKNOWN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schema {
    /// Visual Studio 2005 `Tests` documents
    Legacy,
    /// Visual Studio 2008 and later `TestRun` documents
    Current,
}

#[derive(Debug)]
struct TestResult {
    schema: Schema,
    test_id: Option<String>,
    data_row: Option<String>,
    outcome: Option<String>,
    duration: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    error: Option<String>,
    stack_trace: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
    traces: Vec<String>,
    has_inner: bool,
}

impl TestResult {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            test_id: None,
            data_row: None,
            outcome: None,
            duration: None,
            start_time: None,
            end_time: None,
            error: None,
            stack_trace: None,
            stdout: None,
            stderr: None,
            traces: Vec::new(),
            has_inner: false,
        }
    }
}

#[derive(Debug, Default)]
struct Definition {
    id: Option<String>,
    class_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

/// Per-report state of the TRX dialect
#[derive(Debug, Default)]
pub struct Trx<K> {
    names: HashMap<String, String>,
    definition: Definition,
    results: Vec<TestResult>,
    run_error: (Option<String>, Option<String>),
    flavor: PhantomData<K>,
}

type W<K> = Walk<Trx<K>>;

impl<K: TrxFlavor> Dialect for Trx<K> {
    const TOOL: &'static str = "MSTest";
    const EXPECTED_ROOT: &'static str = "\"TestRun\" or \"Tests\" root element expected";
    const COMPLETE_ROOTS: &'static [&'static str] = &["TestRun", "Tests"];

    fn rules() -> Vec<Rule<W<K>>> {
        result_rules()
    }

    fn walk(bytes: &[u8], walk: &mut W<K>) -> Outcome {
        walk.out.suite_found(K::SUITE);

        let names = xml_visitor::visit(bytes, &name_rules(), walk);
        if let Outcome::UnexpectedRoot(found) = names {
            return Outcome::UnexpectedRoot(found);
        }
        let definitions = walk.state.names.len();
        if definitions == 0 {
            walk.out.message(ReportEvent::error(
                "There were no test definitions found. Wrong or broken .trx file?",
            ));
        } else {
            walk.out
                .message(ReportEvent::info(format!("Found {definitions} test definitions.")));
        }

        xml_visitor::visit(bytes, &Self::rules(), walk)
    }

    fn finish(walk: &mut W<K>) {
        let reported = walk.out.tests_seen();
        if reported == 0 {
            walk.out.message(ReportEvent::error(
                "There were no tests reported. Wrong or broken .trx file?",
            ));
        } else {
            walk.out
                .message(ReportEvent::info(format!("{reported} test(s) were reported")));
        }
        walk.out.suite_finished(K::SUITE);
    }

    fn result(walk: &W<K>) -> ParsingResult {
        ParsingResult {
            suites: 1,
            tests: walk.out.tests_reported(),
            ..Default::default()
        }
    }
}

static ANY_TEST: LazyLock<ElementPattern> = LazyLock::new(|| regex(".*Test"));
static ANY_RESULT: LazyLock<ElementPattern> = LazyLock::new(|| regex(".*Result"));

fn regex(pattern: &str) -> ElementPattern {
    ElementPattern::regex(pattern).expect("element pattern")
}

fn name_rules<K: TrxFlavor>() -> Vec<Rule<W<K>>> {
    vec![
        Rule::path(&["TestRun", "TestDefinitions"], |_: &mut W<K>, _: &ElementCursor| {
            Visit::children(vec![unit_test_definition(), Rule::new(ANY_TEST.clone(), other_definition)])
        }),
        Rule::path(&["Tests", "TestRun", "tests"], |_: &mut W<K>, _: &ElementCursor| {
            Visit::children(vec![
                Rule::text(&["key", "id"], |w: &mut W<K>, text| {
                    w.state.definition.id = Some(text.trim().to_string());
                }),
                Rule::path(&["value", "testMethod"], |_: &mut W<K>, _: &ElementCursor| {
                    Visit::children_then(
                        vec![
                            Rule::text(&["className"], |w: &mut W<K>, text| {
                                w.state.definition.class_name = Some(text)
                            }),
                            Rule::text(&["name"], |w: &mut W<K>, text| {
                                w.state.definition.name = Some(text)
                            }),
                        ],
                        |w: &mut W<K>| {
                            let definition = std::mem::take(&mut w.state.definition);
                            let name = method_name(
                                definition.class_name.as_deref(),
                                definition.name.as_deref(),
                            );
                            if let (Some(id), Some(name)) = (definition.id, name) {
                                w.state.names.insert(id, name);
                            }
                        },
                    )
                }),
            ])
        }),
    ]
}

/// `Namespace.Class.method`; the assembly part of the class name is cut off.
fn method_name(class_name: Option<&str>, name: Option<&str>) -> Option<String> {
    let (class_name, name) = (class_name?, name?);
    let class_name = match class_name.find(',') {
        Some(pos) if pos > 0 => &class_name[..pos],
        _ => class_name,
    };
    Some(format!("{class_name}.{name}"))
}

fn unit_test_definition<K: TrxFlavor>() -> Rule<W<K>> {
    Rule::element("UnitTest", |w: &mut W<K>, el: &ElementCursor| {
        let Some(id) = el.attr_owned("id") else {
            return Visit::skip();
        };
        w.state.definition = Definition {
            id: Some(id),
            ..Default::default()
        };
        Visit::children_then(
            vec![
                Rule::element("TestMethod", |w: &mut W<K>, el: &ElementCursor| {
                    w.state.definition.class_name = el.attr_owned("className");
                    w.state.definition.name = el.attr_owned("name");
                    Visit::skip()
                }),
                Rule::text(&["Description"], |w: &mut W<K>, text| {
                    w.state.definition.description = Some(text)
                }),
            ],
            |w: &mut W<K>| {
                let definition = std::mem::take(&mut w.state.definition);
                let name = method_name(definition.class_name.as_deref(), definition.name.as_deref())
                    .filter(|n| !n.is_empty());
                let description = definition.description.filter(|d| !d.is_empty());
                let display = match (name, description) {
                    (Some(name), Some(description)) => Some(format!("{name} ({description})")),
                    (Some(name), None) => Some(name),
                    (None, description) => description,
                };
                if let (Some(id), Some(display)) = (definition.id, display) {
                    w.state.names.insert(id, display);
                }
            },
        )
    })
}

fn other_definition<K: TrxFlavor>(w: &mut W<K>, el: &ElementCursor) -> Visit<W<K>> {
    if let (Some(id), Some(name)) = (el.attr_owned("id"), el.attr_owned("name")) {
        w.state.names.insert(id, name);
    }
    Visit::skip()
}

fn result_rules<K: TrxFlavor>() -> Vec<Rule<W<K>>> {
    vec![
        Rule::element("TestRun", |_: &mut W<K>, _: &ElementCursor| {
            Visit::children(vec![
                Rule::path(&["ResultSummary", "RunInfos", "RunInfo"], run_info),
                Rule::element("Results", |_: &mut W<K>, _: &ElementCursor| {
                    Visit::children(recursive_results())
                }),
            ])
        }),
        Rule::element("Tests", |_: &mut W<K>, _: &ElementCursor| {
            Visit::children(vec![legacy_result()])
        }),
    ]
}

fn run_info<K: TrxFlavor>(w: &mut W<K>, el: &ElementCursor) -> Visit<W<K>> {
    let outcome = TestOutcome::by_name(el.attr("outcome").unwrap_or_default());
    if outcome.status == Status::Passed {
        return Visit::skip();
    }
    w.state.run_error = (None, None);
    Visit::children_then(
        vec![
            Rule::text(&["Text"], |w: &mut W<K>, text| w.state.run_error.0 = Some(text)),
            Rule::text(&["Exception"], |w: &mut W<K>, text| w.state.run_error.1 = Some(text)),
        ],
        |w: &mut W<K>| {
            let (text, exception) = std::mem::take(&mut w.state.run_error);
            if text.is_some() || exception.is_some() {
                w.out.message(ReportEvent::error(format!(
                    "Runner error: {}\r\n{}",
                    text.unwrap_or_default(),
                    exception.unwrap_or_default()
                )));
            }
        },
    )
}

fn recursive_results<K: TrxFlavor>() -> Vec<Rule<W<K>>> {
    vec![
        Rule::new(ANY_RESULT.clone(), result),
        Rule::path(&["TestResultAggregation"], |_: &mut W<K>, _: &ElementCursor| {
            Visit::children(vec![Rule::new(ANY_RESULT.clone(), result)])
        }),
    ]
}

fn with_result<K: TrxFlavor>(w: &mut W<K>, apply: impl FnOnce(&mut TestResult)) {
    if let Some(result) = w.state.results.last_mut() {
        apply(result);
    }
}

fn result<K: TrxFlavor>(w: &mut W<K>, el: &ElementCursor) -> Visit<W<K>> {
    let mut result = TestResult::new(Schema::Current);
    result.test_id = el.attr_owned("testId");
    result.outcome = el.attr_owned("outcome");
    result.duration = el.attr_owned("duration");
    result.data_row = el.attr_owned("dataRowInfo");
    result.start_time = el.attr_owned("startTime");
    result.end_time = el.attr_owned("endTime");
    w.state.results.push(result);

    Visit::children_then(
        vec![
            Rule::element("InnerResults", |w: &mut W<K>, _: &ElementCursor| {
                with_result(w, |r| r.has_inner = true);
                Visit::children(recursive_results())
            }),
            Rule::element("Output", |_: &mut W<K>, _: &ElementCursor| {
                Visit::children(vec![
                    Rule::text(&["StdOut"], |w: &mut W<K>, text| {
                        with_result(w, |r| r.stdout = Some(text))
                    }),
                    Rule::text(&["StdErr"], |w: &mut W<K>, text| {
                        with_result(w, |r| r.stderr = Some(text))
                    }),
                    Rule::text(&["ErrorInfo", "Message"], |w: &mut W<K>, text| {
                        with_result(w, |r| r.error = Some(text))
                    }),
                    Rule::text(&["ErrorInfo", "StackTrace"], |w: &mut W<K>, text| {
                        with_result(w, |r| r.stack_trace = Some(text))
                    }),
                ])
            }),
        ],
        |w: &mut W<K>| {
            if let Some(result) = w.state.results.pop() {
                if !result.has_inner {
                    process_test(w, result);
                }
            }
        },
    )
}

fn legacy_result<K: TrxFlavor>() -> Rule<W<K>> {
    Rule::element("UnitTestResult", |w: &mut W<K>, _: &ElementCursor| {
        w.state.results.push(TestResult::new(Schema::Legacy));
        Visit::children_then(
            vec![
                Rule::text(&["id", "testId", "id"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.test_id = Some(text.trim().to_string()))
                }),
                Rule::text(&["duration"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.duration = Some(text))
                }),
                Rule::text(&["errorInfo", "message"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.error = Some(text))
                }),
                Rule::text(&["errorInfo", "stackTrace"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.stack_trace = Some(text))
                }),
                Rule::text(&["traceInfo", "trace"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.traces.push(text))
                }),
                Rule::text(&["outcome", "value__"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.outcome = Some(text))
                }),
                Rule::text(&["stdout"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.stdout = Some(text))
                }),
                Rule::text(&["stderr"], |w: &mut W<K>, text| {
                    with_result(w, |r| r.stderr = Some(text))
                }),
            ],
            |w: &mut W<K>| {
                if let Some(result) = w.state.results.pop() {
                    process_test(w, result);
                }
            },
        )
    })
}

fn process_test<K: TrxFlavor>(w: &mut W<K>, result: TestResult) {
    let Some(test_id) = result.test_id.as_deref() else {
        w.out
            .message(ReportEvent::warning("Test '<NA>': Failed to read testId"));
        return;
    };
    let base = w
        .state
        .names
        .get(test_id)
        .map(String::as_str)
        .unwrap_or(test_id);
    let name = match &result.data_row {
        Some(row) => format!("{base}({row})"),
        None => base.to_string(),
    };

    let Some(raw_outcome) = result.outcome.as_deref() else {
        w.out.message(ReportEvent::warning(format!(
            "Test '{name}': Failed to read testOutcome"
        )));
        return;
    };
    let outcome = match result.schema {
        Schema::Legacy => TestOutcome::by_value(raw_outcome),
        Schema::Current => TestOutcome::by_name(raw_outcome),
    };

    let mut events = vec![ReportEvent::TestStarted { name: name.clone() }];
    if let Some(stdout) = &result.stdout {
        events.push(ReportEvent::TestStdOut {
            name: name.clone(),
            text: stdout.clone(),
        });
    }
    for trace in result.traces.iter().filter(|t| !t.trim().is_empty()) {
        events.push(ReportEvent::TestStdOut {
            name: name.clone(),
            text: trace.clone(),
        });
    }
    if let Some(stderr) = &result.stderr {
        events.push(ReportEvent::TestStdErr {
            name: name.clone(),
            text: stderr.clone(),
        });
    }

    let mut error = result.error.clone();
    let stack_trace = result.stack_trace.clone();
    if is_blank(error.as_deref()) && is_blank(stack_trace.as_deref()) {
        error = Some(outcome.name.to_string());
    }
    match outcome.status {
        Status::Ignored => {
            let mut message = error.unwrap_or_default();
            if let Some(stack_trace) = &stack_trace {
                message.push(' ');
                message.push_str(stack_trace);
            }
            events.push(ReportEvent::TestIgnored {
                name: name.clone(),
                message,
            });
        }
        Status::Failed => events.push(ReportEvent::TestFailed {
            name: name.clone(),
            message: error.unwrap_or_default(),
            stack_trace,
        }),
        Status::Passed => {}
    }

    let duration_ms = test_duration(&result, &name, &mut events);
    events.push(ReportEvent::TestFinished { name, duration_ms });
    w.out.test(events);
}

/// Clock duration, else the start/end delta, else 0 with a warning.
fn test_duration(result: &TestResult, name: &str, events: &mut Vec<ReportEvent>) -> u64 {
    if let Some(duration) = result.duration.as_deref().filter(|d| !d.trim().is_empty()) {
        if let Some(ms) = parse_clock(duration) {
            return ms;
        }
        events.push(ReportEvent::warning(format!(
            "Test '{name}': Failed to parse duration from duration attribute '{duration}'. 0ms is chosen"
        )));
    }

    if let (Some(start), Some(end)) = (
        result.start_time.as_deref().filter(|s| !s.trim().is_empty()),
        result.end_time.as_deref().filter(|e| !e.trim().is_empty()),
    ) {
        if let Some(ms) = parse_timestamp_delta(start, end) {
            return ms;
        }
        events.push(ReportEvent::warning(format!(
            "Test '{name}': Failed to parse duration from startTime '{start}' and endTime '{end}'. 0ms is chosen"
        )));
    }

    events.push(ReportEvent::warning(format!(
        "Test '{name}': Failed to find test duration. 0ms is chosen"
    )));
    0
}
