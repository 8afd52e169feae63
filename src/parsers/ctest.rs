//! CTest `Test.xml` dashboard reports.

use tracing::debug;

use crate::duration::parse_seconds;
use crate::sink::ReportEvent;
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::{Dialect, ParsingResult, Walk};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Status {
    Completed,
    #[default]
    Failed,
    NotRun,
}

impl Status {
    fn of(status: Option<&str>) -> Self {
        match status {
            Some("passed") => Status::Completed,
            Some("notrun") => Status::NotRun,
            _ => Status::Failed,
        }
    }
}

#[derive(Debug, Default)]
struct TestData {
    name: Option<String>,
    status: Status,
    duration_ms: u64,
    exit_code: Option<String>,
    exit_value: i64,
    completion_status: Option<String>,
    reason: Option<String>,
    log: Option<String>,
}

impl TestData {
    fn failure_message(&self) -> String {
        let mut message = String::new();
        match self.completion_status.as_deref() {
            Some(status @ "Failed to start") => {
                message.push_str(status);
                if let Some(code) = &self.exit_code {
                    message.push_str(&format!(" (\"{code}\")"));
                }
            }
            Some(status @ "Not run") => message.push_str(status),
            Some("Completed") => {
                if let Some(code) = &self.exit_code {
                    message.push_str(&format!("\"{code}\" "));
                }
                message.push_str(&format!("(exit code: {})", self.exit_value));
            }
            Some(status) => {
                message.push_str(&format!("Unknown status: {status} "));
                if let Some(code) = &self.exit_code {
                    message.push_str(&format!("{code} "));
                }
                message.push_str(&format!("(exit code: {})", self.exit_value));
            }
            None => {}
        }
        if let Some(reason) = &self.reason {
            message.push(' ');
            message.push_str(reason);
        }
        message
    }

    fn measurement(&mut self, name: &str, kind: Option<&str>, value: Option<String>) {
        match name {
            "Execution Time" => self.duration_ms = parse_seconds(value.as_deref()),
            "Exit Code" => self.exit_code = value,
            "Exit Value" => {
                if let Some(exit_value) = value.and_then(|v| v.trim().parse().ok()) {
                    self.exit_value = exit_value;
                }
            }
            "Pass Reason" | "Fail Reason" => self.reason = value,
            "Completion Status" => self.completion_status = value,
            // Already present as FullCommandLine
            "Command Line" => {}
            _ => debug!(
                test = self.name.as_deref().unwrap_or_default(),
                measurement = name,
                kind = kind.unwrap_or_default(),
                value = value.as_deref().unwrap_or_default(),
                "named measurement"
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct CTest {
    test: Option<TestData>,
    measurement: Option<String>,
}

type W = Walk<CTest>;

impl Dialect for CTest {
    const TOOL: &'static str = "CTest documentation";
    const EXPECTED_ROOT: &'static str = "\"Site\" root element expected.";

    fn unexpected_root_message() -> String {
        format!(
            "{}\nPlease check {} for the supported schema",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::path(&["Site", "Testing"], |_: &mut W, _: &ElementCursor| {
            Visit::children(vec![
                Rule::element("TestList", |_: &mut W, _: &ElementCursor| Visit::skip()),
                test(),
            ])
        })]
    }

    fn result(walk: &W) -> ParsingResult {
        let tests = walk.out.tests_reported();
        ParsingResult {
            suites: usize::from(tests > 0),
            tests,
            ..Default::default()
        }
    }
}

fn with_test(w: &mut W, apply: impl FnOnce(&mut TestData)) {
    if let Some(test) = w.state.test.as_mut() {
        apply(test);
    }
}

fn test() -> Rule<W> {
    Rule::element("Test", |w: &mut W, el: &ElementCursor| {
        w.state.test = Some(TestData {
            status: Status::of(el.attr("Status")),
            ..Default::default()
        });
        Visit::children_then(
            vec![
                Rule::text(&["Name"], |w: &mut W, text| {
                    with_test(w, |t| t.name = Some(text.replace('.', "_")))
                }),
                Rule::element("Results", |_: &mut W, _: &ElementCursor| {
                    Visit::children(vec![
                        Rule::element("NamedMeasurement", named_measurement),
                        // Compressed logs are kept as written
                        Rule::text(&["Measurement", "Value"], |w: &mut W, text| {
                            with_test(w, |t| t.log = Some(text))
                        }),
                    ])
                }),
            ],
            |w: &mut W| {
                if let Some(test) = w.state.test.take() {
                    test_found(w, test);
                }
            },
        )
    })
}

fn named_measurement(w: &mut W, el: &ElementCursor) -> Visit<W> {
    let name = el.attr_owned("name");
    let kind = el.attr_owned("type");
    w.state.measurement = None;
    Visit::children_then(
        vec![Rule::text(&["Value"], |w: &mut W, text| {
            w.state.measurement = Some(text)
        })],
        move |w: &mut W| {
            let value = w.state.measurement.take();
            if let Some(name) = name {
                with_test(w, |t| t.measurement(&name, kind.as_deref(), value));
            }
        },
    )
}

fn test_found(w: &mut W, test: TestData) {
    let Some(name) = test.name.clone() else {
        let file = w.file.clone();
        w.out.test([ReportEvent::warning(format!(
            "File {file} contains unnamed test"
        ))]);
        return;
    };

    let log = test.log.as_deref().filter(|l| !l.trim().is_empty());
    let mut events = vec![ReportEvent::TestStarted { name: name.clone() }];
    match test.status {
        Status::NotRun => events.push(ReportEvent::TestIgnored {
            name: name.clone(),
            message: String::new(),
        }),
        Status::Completed => {
            if let Some(log) = log {
                events.push(ReportEvent::TestStdOut {
                    name: name.clone(),
                    text: log.to_string(),
                });
            }
        }
        Status::Failed => {
            if let Some(log) = log {
                events.push(ReportEvent::TestStdErr {
                    name: name.clone(),
                    text: log.to_string(),
                });
            }
            events.push(ReportEvent::TestFailed {
                name: name.clone(),
                message: test.failure_message(),
                stack_trace: None,
            });
        }
    }
    events.push(ReportEvent::TestFinished {
        name,
        duration_ms: test.duration_ms,
    });
    w.out.test(events);
}
