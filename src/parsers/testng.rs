//! TestNG `testng-results.xml` reports.

use crate::duration::{is_number, parse_millis};
use crate::sink::{ReportEvent, join_type_and_message};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::text::qualified_name;
use super::{Dialect, Walk};

#[derive(Debug, Default)]
pub struct TestNg {
    method: Option<TestMethod>,
    reporter_lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Status {
    Pass,
    Fail,
    #[default]
    Skip,
}

impl Status {
    fn of(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("PASS") => Status::Pass,
            Some(s) if s.eq_ignore_ascii_case("FAIL") => Status::Fail,
            _ => Status::Skip,
        }
    }
}

#[derive(Debug, Default)]
struct TestMethod {
    class_name: Option<String>,
    method_name: Option<String>,
    duration_ms: u64,
    status: Status,
    indexed: Vec<Option<String>>,
    unindexed: Vec<String>,
    lines: Vec<String>,
    failure_type: Option<String>,
    failure_message: Option<String>,
    stack_trace: Option<String>,
}

/// Indices past this are treated as missing, like unparseable ones
const MAX_PARAM_INDEX: usize = 1024;

impl TestMethod {
    fn add_param(&mut self, index: Option<&str>, value: &str) {
        let quoted = format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""));
        match index
            .filter(|i| is_number(i))
            .and_then(|i| i.parse::<usize>().ok())
            .filter(|&idx| idx < MAX_PARAM_INDEX)
        {
            Some(idx) => {
                if self.indexed.len() <= idx {
                    self.indexed.resize(idx + 1, None);
                }
                self.indexed[idx] = Some(quoted);
            }
            None => self.unindexed.push(quoted),
        }
    }

    /// Indexed parameters in place; gaps are filled from the unindexed ones.
    fn params(&self) -> Vec<String> {
        let mut spare = self.unindexed.iter();
        let mut params: Vec<String> = self
            .indexed
            .iter()
            .map(|p| match p {
                Some(value) => value.clone(),
                None => spare.next().cloned().unwrap_or_else(|| "null".to_string()),
            })
            .collect();
        params.extend(spare.cloned());
        params
    }

    fn test_name(&self) -> Option<String> {
        let name = qualified_name(self.class_name.as_deref(), self.method_name.as_deref())?;
        let params = self.params();
        Some(if params.is_empty() {
            name
        } else {
            format!("{name}({})", params.join(", "))
        })
    }
}

type W = Walk<TestNg>;

impl Dialect for TestNg {
    const TOOL: &'static str = "Ant TestNG Task";
    const EXPECTED_ROOT: &'static str = "\"testng-results\" root element expected";

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::element("testng-results", |_: &mut W, _: &ElementCursor| {
            Visit::children(vec![
                Rule::element("reporter-output", |w: &mut W, _: &ElementCursor| {
                    w.state.reporter_lines.clear();
                    Visit::children_then(
                        vec![Rule::text(&["line"], |w: &mut W, text| {
                            w.state.reporter_lines.push(text.trim().to_string())
                        })],
                        |w: &mut W| {
                            let output = std::mem::take(&mut w.state.reporter_lines).join("\n");
                            if !output.is_empty() {
                                w.out.message(ReportEvent::info(format!(
                                    "System out from suite TestNG: {output}"
                                )));
                            }
                        },
                    )
                }),
                nested_suite("suite", |_| vec![nested_suite("test", |_| vec![class()])]),
            ])
        })]
    }
}

/// A `suite` or `test` element, opened as a suite when it has a name.
fn nested_suite(element: &str, children: fn(&ElementCursor) -> Vec<Rule<W>>) -> Rule<W> {
    Rule::element(element, move |w: &mut W, el: &ElementCursor| {
        open(w, el.attr_owned("name"), children(el))
    })
}

fn open(w: &mut W, name: Option<String>, rules: Vec<Rule<W>>) -> Visit<W> {
    match name {
        Some(name) => {
            w.out.suite_found(&name);
            Visit::children_then(rules, move |w: &mut W| w.out.suite_finished(&name))
        }
        None => Visit::children(rules),
    }
}

fn class() -> Rule<W> {
    Rule::element("class", |w: &mut W, el: &ElementCursor| {
        let class_name = el.attr_owned("name");
        let rules = vec![test_method(class_name.clone())];
        open(w, class_name, rules)
    })
}

fn with_method(w: &mut W, apply: impl FnOnce(&mut TestMethod)) {
    if let Some(method) = w.state.method.as_mut() {
        apply(method);
    }
}

fn test_method(class_name: Option<String>) -> Rule<W> {
    Rule::element("test-method", move |w: &mut W, el: &ElementCursor| {
        w.state.method = Some(TestMethod {
            class_name: class_name.clone(),
            method_name: el.attr_owned("name"),
            duration_ms: parse_millis(el.attr("duration-ms")),
            status: Status::of(el.attr("status")),
            ..Default::default()
        });

        Visit::children_then(
            vec![
                Rule::path(&["params", "param"], |_: &mut W, el: &ElementCursor| {
                    let index = el.attr_owned("index");
                    Visit::children(vec![Rule::text(&["value"], move |w: &mut W, text| {
                        with_method(w, |m| m.add_param(index.as_deref(), text.trim()))
                    })])
                }),
                Rule::text(&["reporter-output", "line"], |w: &mut W, text| {
                    with_method(w, |m| m.lines.push(text.trim().to_string()))
                }),
                Rule::element("exception", |w: &mut W, el: &ElementCursor| {
                    let kind = el.attr_owned("class");
                    with_method(w, |m| m.failure_type = kind);
                    Visit::children(vec![
                        Rule::text(&["message"], |w: &mut W, text| {
                            with_method(w, |m| m.failure_message = Some(text.trim().to_string()))
                        }),
                        Rule::text(&["short-stacktrace"], |w: &mut W, text| {
                            with_method(w, |m| m.stack_trace = Some(text.trim().to_string()))
                        }),
                        Rule::text(&["full-stacktrace"], |w: &mut W, text| {
                            with_method(w, |m| m.stack_trace = Some(text.trim().to_string()))
                        }),
                    ])
                }),
            ],
            |w: &mut W| {
                if let Some(method) = w.state.method.take() {
                    test_found(w, method);
                }
            },
        )
    })
}

fn test_found(w: &mut W, method: TestMethod) {
    let Some(name) = method.test_name() else {
        let file = w.file.clone();
        w.out.test([ReportEvent::warning(format!(
            "File {file} contains unnamed test"
        ))]);
        return;
    };

    let mut events = vec![ReportEvent::TestStarted { name: name.clone() }];
    match method.status {
        Status::Pass => {}
        Status::Fail => {
            if method.failure_type.is_some()
                || method.failure_message.is_some()
                || method.stack_trace.is_some()
            {
                events.push(ReportEvent::TestFailed {
                    name: name.clone(),
                    message: join_type_and_message(
                        method.failure_type.as_deref(),
                        method.failure_message.as_deref(),
                    ),
                    stack_trace: method.stack_trace.clone(),
                });
            }
        }
        Status::Skip => events.push(ReportEvent::TestIgnored {
            name: name.clone(),
            message: method.failure_message.clone().unwrap_or_default(),
        }),
    }
    let output = method.lines.join("\n");
    if !output.is_empty() {
        events.push(ReportEvent::TestStdOut {
            name: name.clone(),
            text: output,
        });
    }
    events.push(ReportEvent::TestFinished {
        name,
        duration_ms: method.duration_ms,
    });
    w.out.test(events);
}
