//! NUnit 2 (`test-results`) and NUnit 3 (`test-run`) reports.

use std::sync::LazyLock;

use crate::duration::parse_seconds;
use crate::sink::ReportEvent;
use crate::xml_visitor::{ElementCursor, ElementPattern, Rule, Visit};

use super::{Dialect, Walk};

/// NUnit dialect state
#[derive(Debug, Default)]
pub struct NUnit {
    test: Option<NUnitTest>,
    details: Details,
}

#[derive(Debug, Default)]
struct NUnitTest {
    name: Option<String>,
    ignored: bool,
    success: bool,
    duration_ms: u64,
    message: Option<String>,
    stack_trace: Option<String>,
    output: Option<String>,
}

/// Message and stack trace of a suite-level `failure` or `reason`
#[derive(Debug, Default)]
struct Details {
    message: Option<String>,
    stack_trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V2,
    V3,
}

impl Version {
    fn ignored(self, el: &ElementCursor) -> bool {
        let result = el.attr("result").unwrap_or_default();
        match self {
            Version::V2 => {
                el.attr("executed")
                    .is_some_and(|e| e.eq_ignore_ascii_case("false"))
                    || matches!(result, "Inconclusive" | "Ignored" | "Skipped" | "NotRunnable")
            }
            Version::V3 => matches!(result, "Inconclusive" | "Skipped"),
        }
    }

    fn success(self, el: &ElementCursor) -> bool {
        match self {
            Version::V2 => {
                el.attr("result") == Some("Success")
                    || (el.attr_bool("success") && !self.ignored(el))
            }
            Version::V3 => el.attr("result") == Some("Passed"),
        }
    }

    fn duration_attribute(self) -> &'static str {
        match self {
            Version::V2 => "time",
            Version::V3 => "duration",
        }
    }
}

type W = Walk<NUnit>;

impl Dialect for NUnit {
    const TOOL: &'static str = "NUnit";
    const EXPECTED_ROOT: &'static str =
        "must contain \"test-results\", \"test-run\" or \"stack-trace\" root element";

    fn unexpected_root_message() -> String {
        format!(
            "{}\nPlease check the NUnit sources for the supported XML Schema",
            Self::EXPECTED_ROOT
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![
            Rule::element("test-results", |_: &mut W, _: &ElementCursor| {
                Visit::children(vec![v2_suite(true)])
            }),
            Rule::element("test-run", |_: &mut W, _: &ElementCursor| {
                Visit::children(vec![v3_suite()])
            }),
            Rule::text(&["stack-trace"], |w: &mut W, text| {
                let file = w.file.clone();
                w.out.failure(format!("{file}: general failure:\n{text}"));
            }),
        ]
    }
}

fn v2_suite_name(name: Option<&str>) -> Option<String> {
    let name = name?.replace('\\', "/");
    Some(match name.rfind('/') {
        Some(pos) => name[pos + 1..].to_string(),
        None => name,
    })
}

fn v2_suite(logged: bool) -> Rule<W> {
    Rule::element("test-suite", move |w: &mut W, el: &ElementCursor| {
        let name = v2_suite_name(el.attr("name"));
        let ignored = Version::V2.ignored(el);
        let failed = !Version::V2.success(el);

        let opened = logged && open_suite(w, name.as_deref());
        let label = name.clone().unwrap_or_default();
        let rules = vec![
            Rule::element("results", |_: &mut W, _: &ElementCursor| {
                Visit::children(vec![v2_suite(false), test_case(Version::V2)])
            }),
            suite_failure(label, ignored, failed, true),
        ];
        match name.filter(|_| opened) {
            Some(name) => Visit::children_then(rules, move |w: &mut W| w.out.suite_finished(&name)),
            None => Visit::children(rules),
        }
    })
}

fn v3_suite() -> Rule<W> {
    Rule::element("test-suite", |w: &mut W, el: &ElementCursor| {
        let name = el.attr_owned("name").unwrap_or_default();
        let logged = match el.attr("fullname").filter(|f| !f.is_empty()) {
            None => true,
            Some(full_name) => full_name.ends_with(&name),
        };
        if logged {
            w.out.suite_found(&name);
        }

        let rules = vec![
            v3_suite(),
            test_case(Version::V3),
            suite_failure(
                name.clone(),
                Version::V3.ignored(el),
                !Version::V3.success(el),
                false,
            ),
        ];
        if logged {
            Visit::children_then(rules, move |w: &mut W| w.out.suite_finished(&name))
        } else {
            Visit::children(rules)
        }
    })
}

fn open_suite(w: &mut W, name: Option<&str>) -> bool {
    match name {
        Some(name) => {
            w.out.suite_found(name);
            true
        }
        None => {
            let file = w.file.clone();
            w.out
                .message(ReportEvent::warning(format!("File {file} contains unnamed suite")));
            false
        }
    }
}

static FAILURE_OR_REASON: LazyLock<ElementPattern> =
    LazyLock::new(|| ElementPattern::regex("failure|reason").expect("failure pattern"));

fn failure_or_reason() -> ElementPattern {
    FAILURE_OR_REASON.clone()
}

fn suite_failure(name: String, ignored: bool, failed: bool, fail_on_failure: bool) -> Rule<W> {
    Rule::new(failure_or_reason(), move |w: &mut W, _: &ElementCursor| {
        w.state.details = Details::default();
        let name = name.clone();
        Visit::children_then(
            vec![
                Rule::text(&["message"], |w: &mut W, text| {
                    w.state.details.message = Some(text.trim().to_string());
                }),
                Rule::text(&["stack-trace"], |w: &mut W, text| {
                    w.state.details.stack_trace = Some(text.trim().to_string());
                }),
            ],
            move |w: &mut W| {
                let details = std::mem::take(&mut w.state.details);
                let message = details_message(&details);
                let file = w.file.clone();
                if ignored {
                    w.out.message(ReportEvent::warning(format!(
                        "{file}: suite {name} ignored{message}"
                    )));
                } else if failed {
                    let text = format!("{file}: suite {name} failure{message}");
                    if fail_on_failure {
                        w.out.failure(text);
                    } else {
                        w.out.message(ReportEvent::warning(text));
                    }
                } else if !message.is_empty() {
                    w.out
                        .message(ReportEvent::info(format!("{file}: suite {name}{message}")));
                }
            },
        )
    })
}

fn details_message(details: &Details) -> String {
    let message = details.message.as_deref().filter(|m| !m.is_empty());
    let trace = details.stack_trace.as_deref().filter(|t| !t.is_empty());
    match (message, trace) {
        (None, None) => String::new(),
        (message, None) => format!(": {}", message.unwrap_or_default()),
        (message, Some(trace)) => format!(": {}\n{trace}", message.unwrap_or_default()),
    }
}

fn test_case(version: Version) -> Rule<W> {
    Rule::element("test-case", move |w: &mut W, el: &ElementCursor| {
        w.state.test = Some(NUnitTest {
            name: el.attr_owned("name"),
            ignored: version.ignored(el),
            success: version.success(el),
            duration_ms: parse_seconds(el.attr(version.duration_attribute())),
            ..Default::default()
        });

        let mut rules = Vec::new();
        if version == Version::V3 {
            rules.push(Rule::text(&["output"], |w: &mut W, text| {
                if let Some(test) = w.state.test.as_mut() {
                    test.output = Some(text.trim().to_string());
                }
            }));
        }
        rules.push(Rule::new(failure_or_reason(), |w: &mut W, el: &ElementCursor| {
            if el.name() == "failure" {
                if let Some(test) = w.state.test.as_mut() {
                    test.success = false;
                }
            }
            Visit::children(vec![
                Rule::text(&["message"], |w: &mut W, text| {
                    if let Some(test) = w.state.test.as_mut() {
                        test.message = Some(text.trim().to_string());
                    }
                }),
                Rule::text(&["stack-trace"], |w: &mut W, text| {
                    if let Some(test) = w.state.test.as_mut() {
                        test.stack_trace = Some(text.trim().to_string());
                    }
                }),
            ])
        }));

        Visit::children_then(rules, |w: &mut W| {
            if let Some(test) = w.state.test.take() {
                test_found(w, test);
            }
        })
    })
}

fn test_found(w: &mut W, test: NUnitTest) {
    let Some(name) = test.name else {
        let file = w.file.clone();
        w.out.test([ReportEvent::warning(format!(
            "File {file} contains unnamed test"
        ))]);
        return;
    };

    let mut events = vec![ReportEvent::TestStarted { name: name.clone() }];
    if let Some(output) = test.output.filter(|o| !o.is_empty()) {
        events.push(ReportEvent::TestStdOut {
            name: name.clone(),
            text: output,
        });
    }
    if test.ignored {
        events.push(ReportEvent::TestIgnored {
            name: name.clone(),
            message: test.message.unwrap_or_default(),
        });
    } else if test.success {
        if let Some(message) = test.message.filter(|m| !m.trim().is_empty()) {
            events.push(ReportEvent::TestStdOut {
                name: name.clone(),
                text: message,
            });
        }
    } else {
        events.push(ReportEvent::TestFailed {
            name: name.clone(),
            message: test.message.unwrap_or_default(),
            stack_trace: test.stack_trace,
        });
    }
    events.push(ReportEvent::TestFinished {
        name,
        duration_ms: test.duration_ms,
    });
    w.out.test(events);
}
