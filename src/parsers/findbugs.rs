//! FindBugs `BugCollection` reports.
//!
//! Bug pattern and category descriptions are embedded in reports written
//! with messages and may follow the bug instances, so they are collected in
//! a first pass over the complete document.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::sink::{InspectionFinding, InspectionType, ReportEvent};
use crate::xml_visitor::{self, ElementCursor, ElementPattern, Outcome, Rule, Visit};

use super::text::{capitalize, format_text};
use super::{Dialect, ParsingResult, Tally, Walk};

#[derive(Debug, Default, Clone)]
struct NameAndDescription {
    name: String,
    description: String,
}

/// Primary source line wins over any other one
#[derive(Debug, Default)]
struct SourceLine {
    primary: bool,
    file: Option<String>,
    line: i64,
}

impl SourceLine {
    fn update(&mut self, el: &ElementCursor) {
        if el.attr_bool("primary") {
            self.primary = true;
        } else if self.primary {
            return;
        }
        self.file = el.attr_owned("sourcepath");
        let line = el.attr_int("start");
        if line > 0 {
            self.line = line;
        }
    }
}

#[derive(Debug, Default)]
struct BugInstance {
    kind: Option<String>,
    category: Option<String>,
    priority: i64,
    class_name: Option<String>,
    message: Option<String>,
    details: String,
    source: SourceLine,
}

#[derive(Debug, Default)]
pub struct FindBugs {
    patterns: HashMap<String, NameAndDescription>,
    categories: HashMap<String, NameAndDescription>,
    /// Key of the pattern or category whose texts are being read
    describing: Option<String>,
    bug: Option<BugInstance>,
    reported_types: HashSet<String>,
    tally: Tally,
}

type W = Walk<FindBugs>;

impl Dialect for FindBugs {
    const TOOL: &'static str = "FindBugs";
    const EXPECTED_ROOT: &'static str = "\"BugCollection\" root element not present";
    const COMPLETE_ROOTS: &'static [&'static str] = &["BugCollection"];

    fn unexpected_root_message() -> String {
        format!(
            "{}. Please check {} sources bugcollection.xsd for the supported schema",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::element("BugCollection", |_: &mut W, _: &ElementCursor| {
            Visit::children(vec![bug_instance()])
        })]
    }

    fn walk(bytes: &[u8], walk: &mut W) -> Outcome {
        if let Outcome::UnexpectedRoot(found) = xml_visitor::visit(bytes, &description_rules(), walk) {
            return Outcome::UnexpectedRoot(found);
        }
        xml_visitor::visit(bytes, &Self::rules(), walk)
    }

    fn result(walk: &W) -> ParsingResult {
        walk.state.tally.result()
    }
}

static COLLECTION: LazyLock<ElementPattern> = LazyLock::new(|| pattern(".*Collection"));
static METHOD_OR_FIELD: LazyLock<ElementPattern> = LazyLock::new(|| pattern("Method|Field"));
static MESSAGE: LazyLock<ElementPattern> = LazyLock::new(|| pattern("ShortMessage|LongMessage"));

fn pattern(p: &str) -> ElementPattern {
    ElementPattern::regex(p).expect("element pattern")
}

fn description_rules() -> Vec<Rule<W>> {
    vec![Rule::new(COLLECTION.clone(), |_: &mut W, _: &ElementCursor| {
        Visit::children(vec![
            Rule::element("BugPattern", |w: &mut W, el: &ElementCursor| {
                let Some(kind) = el.attr_owned("type") else {
                    return Visit::skip();
                };
                w.state.patterns.entry(kind.clone()).or_default();
                w.state.describing = Some(kind);
                Visit::children(vec![
                    Rule::text(&["ShortDescription"], |w: &mut W, text| {
                        if let Some(p) = entry(&mut w.state.patterns, &w.state.describing) {
                            p.name = format_text(&text);
                        }
                    }),
                    Rule::text(&["Details"], |w: &mut W, text| {
                        if let Some(p) = entry(&mut w.state.patterns, &w.state.describing) {
                            p.description = format_text(&text);
                        }
                    }),
                ])
            }),
            Rule::element("BugCategory", |w: &mut W, el: &ElementCursor| {
                let Some(category) = el.attr_owned("category") else {
                    return Visit::skip();
                };
                w.state.categories.entry(category.clone()).or_default();
                w.state.describing = Some(category);
                Visit::children(vec![
                    Rule::text(&["Description"], |w: &mut W, text| {
                        if let Some(c) = entry(&mut w.state.categories, &w.state.describing) {
                            c.name = format_text(&text);
                        }
                    }),
                    Rule::text(&["Details"], |w: &mut W, text| {
                        if let Some(c) = entry(&mut w.state.categories, &w.state.describing) {
                            c.description = capitalize(&format_text(&text));
                        }
                    }),
                ])
            }),
        ])
    })]
}

fn entry<'a>(
    table: &'a mut HashMap<String, NameAndDescription>,
    key: &Option<String>,
) -> Option<&'a mut NameAndDescription> {
    table.get_mut(key.as_deref()?)
}

fn with_bug(w: &mut W, apply: impl FnOnce(&mut BugInstance)) {
    if let Some(bug) = w.state.bug.as_mut() {
        apply(bug);
    }
}

fn source_line() -> Rule<W> {
    Rule::element("SourceLine", |w: &mut W, el: &ElementCursor| {
        with_bug(w, |b| b.source.update(el));
        Visit::skip()
    })
}

fn bug_instance() -> Rule<W> {
    Rule::element("BugInstance", |w: &mut W, el: &ElementCursor| {
        w.state.bug = Some(BugInstance {
            kind: el.attr_owned("type"),
            category: el.attr_owned("category"),
            priority: el.attr_int("priority"),
            ..Default::default()
        });
        Visit::children_then(
            vec![
                Rule::element("Class", |w: &mut W, el: &ElementCursor| {
                    let first = w.state.bug.as_ref().is_some_and(|b| b.class_name.is_none());
                    if !first {
                        return Visit::skip();
                    }
                    with_bug(w, |b| b.class_name = el.attr_owned("classname"));
                    Visit::children(vec![source_line()])
                }),
                Rule::new(METHOD_OR_FIELD.clone(), |w: &mut W, el: &ElementCursor| {
                    let own = w
                        .state
                        .bug
                        .as_ref()
                        .is_some_and(|b| b.class_name.is_some() && b.class_name.as_deref() == el.attr("classname"));
                    if !own {
                        return Visit::skip();
                    }
                    with_bug(w, |b| {
                        b.details.push_str(&format!(
                            " {}[name=\"{}\" signature=\"{}\"]",
                            el.name(),
                            el.attr("name").unwrap_or("null"),
                            el.attr("signature").unwrap_or("null")
                        ))
                    });
                    Visit::children(vec![source_line()])
                }),
                Rule::element("LocalVariable", |w: &mut W, el: &ElementCursor| {
                    with_bug(w, |b| {
                        b.details.push_str(&format!(
                            " LocalVariable[name=\"{}\"]",
                            el.attr("name").unwrap_or("null")
                        ))
                    });
                    Visit::skip()
                }),
                source_line(),
                Rule::new(MESSAGE.clone(), |_: &mut W, _: &ElementCursor| {
                    Visit::text(|w: &mut W, text| {
                        with_bug(w, |b| {
                            b.message.get_or_insert_with(|| format_text(&text));
                        })
                    })
                }),
            ],
            |w: &mut W| {
                if let Some(bug) = w.state.bug.take() {
                    bug_found(w, bug);
                }
            },
        )
    })
}

/// Message, falling back to the pattern description, followed by details
fn full_message(message: Option<&str>, default: Option<&str>, details: &str) -> String {
    let message = message.filter(|m| !m.is_empty()).or(default.filter(|d| !d.is_empty()));
    match message {
        Some(message) => format!("{message}{details}"),
        None => details.to_string(),
    }
}

fn bug_found(w: &mut W, bug: BugInstance) {
    w.state.tally.count(bug.priority);

    let kind = bug.kind.unwrap_or_default();
    let raw_category = bug.category.unwrap_or_default();
    let category = w.state.categories.get(&raw_category).cloned();
    let pattern = w.state.patterns.get(&kind).cloned();

    if w.state.reported_types.insert(kind.clone()) {
        w.out.push(ReportEvent::InspectionType(InspectionType {
            id: kind.clone(),
            name: pattern.as_ref().map_or_else(|| kind.clone(), |p| p.name.clone()),
            description: category.as_ref().map(|c| c.description.clone()).unwrap_or_default(),
            category: category.map_or(raw_category, |c| c.name),
        }));
    }

    let message = full_message(
        bug.message.as_deref(),
        pattern.as_ref().map(|p| p.description.as_str()),
        &bug.details,
    );
    w.out.push(ReportEvent::Inspection(InspectionFinding {
        inspection_id: kind,
        message,
        file: bug.source.file.or(bug.class_name).unwrap_or_default(),
        line: u32::try_from(bug.source.line).unwrap_or(0),
        priority: u8::try_from(bug.priority).unwrap_or(u8::MAX),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::parsers::ParseOutcome;
    use crate::parsers::testing::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BugCollection version="1.3.9" sequence="0" timestamp="1" analysisTimestamp="2">
  <Project projectName="demo"><Jar>build/demo.jar</Jar></Project>
  <BugInstance type="NP_NULL_ON_SOME_PATH" priority="1" category="CORRECTNESS">
    <ShortMessage>Possible null pointer dereference</ShortMessage>
    <Class classname="com.example.Service" primary="true">
      <SourceLine classname="com.example.Service" start="10" end="90" sourcepath="com/example/Service.java"/>
    </Class>
    <Method classname="com.example.Service" name="run" signature="()V">
      <SourceLine classname="com.example.Service" start="20" sourcepath="com/example/Service.java"/>
    </Method>
    <Method classname="com.example.Other" name="skip" signature="()V"/>
    <LocalVariable name="value"/>
    <SourceLine classname="com.example.Service" primary="true" start="42" sourcepath="com/example/Service.java"/>
    <SourceLine classname="com.example.Service" start="50" sourcepath="com/example/Later.java"/>
  </BugInstance>
  <BugInstance type="DM_STRING_CTOR" priority="2" category="PERFORMANCE">
    <Class classname="com.example.Util$Inner"/>
  </BugInstance>
  <BugInstance type="NP_NULL_ON_SOME_PATH" priority="3" category="CORRECTNESS">
    <Class classname="com.example.Third"><SourceLine sourcepath="Third.java" start="0"/></Class>
  </BugInstance>
  <BugPattern type="NP_NULL_ON_SOME_PATH" abbrev="NP" category="CORRECTNESS">
    <ShortDescription>Possible null pointer dereference</ShortDescription>
    <Details><![CDATA[<p> There is a branch of statement that, <em>if executed,</em> guarantees a null value.</p>]]></Details>
  </BugPattern>
  <BugCategory category="CORRECTNESS">
    <Description>Correctness</Description>
    <Details>probable bug - an apparent coding mistake</Details>
  </BugCategory>
</BugCollection>"#;

    #[test]
    fn test_bug_instances_with_trailing_descriptions() {
        let (outcome, events) = parse::<FindBugs>(REPORT);
        assert_eq!(
            events,
            vec![
                ReportEvent::InspectionType(InspectionType {
                    id: "NP_NULL_ON_SOME_PATH".into(),
                    name: "Possible null pointer dereference".into(),
                    description: "Probable bug - an apparent coding mistake".into(),
                    category: "Correctness".into(),
                }),
                ReportEvent::Inspection(InspectionFinding {
                    inspection_id: "NP_NULL_ON_SOME_PATH".into(),
                    message: "Possible null pointer dereference Method[name=\"run\" signature=\"()V\"] LocalVariable[name=\"value\"]".into(),
                    file: "com/example/Service.java".into(),
                    line: 42,
                    priority: 1,
                }),
                ReportEvent::InspectionType(InspectionType {
                    id: "DM_STRING_CTOR".into(),
                    name: "DM_STRING_CTOR".into(),
                    description: String::new(),
                    category: "PERFORMANCE".into(),
                }),
                ReportEvent::Inspection(InspectionFinding {
                    inspection_id: "DM_STRING_CTOR".into(),
                    message: String::new(),
                    file: "com.example.Util$Inner".into(),
                    line: 0,
                    priority: 2,
                }),
                ReportEvent::Inspection(InspectionFinding {
                    inspection_id: "NP_NULL_ON_SOME_PATH".into(),
                    message: "There is a branch of statement that, if executed, guarantees a null value.".into(),
                    file: "Third.java".into(),
                    line: 0,
                    priority: 3,
                }),
            ]
        );
        assert_eq!(
            outcome,
            ParseOutcome::Done(ParsingResult {
                errors: 1,
                warnings: 1,
                infos: 1,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_full_message_fallbacks() {
        assert_eq!(full_message(Some("m"), Some("d"), " x"), "m x");
        assert_eq!(full_message(Some(""), Some("d"), ""), "d");
        assert_eq!(full_message(None, None, " x"), " x");
    }

    #[test]
    fn test_wrong_root() {
        let (outcome, events) = parse::<FindBugs>("<pmd></pmd>");
        assert!(events.is_empty());
        match outcome {
            ParseOutcome::Failed(ParseError::UnexpectedRoot { found, expected }) => {
                assert_eq!(found, "pmd");
                assert_eq!(
                    expected,
                    "\"BugCollection\" root element not present. Please check FindBugs sources bugcollection.xsd for the supported schema"
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
