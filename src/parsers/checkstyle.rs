//! Checkstyle `XMLLogger` reports.

use crate::sink::{InspectionFinding, InspectionType, ReportEvent};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::{Dialect, ParsingResult, Tally, Walk};

#[derive(Debug, Default)]
pub struct Checkstyle {
    tally: Tally,
}

type W = Walk<Checkstyle>;

fn priority(severity: Option<&str>) -> u8 {
    match severity {
        Some("error") => 1,
        Some("warning") => 2,
        _ => 3,
    }
}

impl Dialect for Checkstyle {
    const TOOL: &'static str = "checkstyle";
    const EXPECTED_ROOT: &'static str = "\"checkstyle\" root element not present";
    const COMPLETE_ROOTS: &'static [&'static str] = &["checkstyle"];

    fn unexpected_root_message() -> String {
        format!(
            "{}. Please see {} sources XMLLogger.java for the supported format",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::element("checkstyle", |_: &mut W, _: &ElementCursor| {
            Visit::children(vec![
                Rule::element("file", |_: &mut W, el: &ElementCursor| {
                    let file = el.attr_owned("name").unwrap_or_default();
                    Visit::children(vec![Rule::element("error", move |w: &mut W, el: &ElementCursor| {
                        error(w, &file, el);
                        Visit::skip()
                    })])
                }),
                Rule::text(&["exception"], |w: &mut W, text| {
                    let file = w.file.clone();
                    w.out
                        .push(ReportEvent::error(format!("Exception in report {file}\n{}", text.trim())));
                }),
            ])
        })]
    }

    fn result(walk: &W) -> ParsingResult {
        walk.state.tally.result()
    }
}

fn error(w: &mut W, file: &str, el: &ElementCursor) {
    let source = el.attr("source").unwrap_or_default();
    let severity = el.attr("severity");
    let priority = priority(severity);
    w.state.tally.count(i64::from(priority));
    w.out.push(ReportEvent::InspectionType(InspectionType {
        id: source.to_string(),
        name: source.to_string(),
        description: format!("From {source}"),
        category: severity.unwrap_or_default().to_string(),
    }));
    w.out.push(ReportEvent::Inspection(InspectionFinding {
        inspection_id: source.to_string(),
        message: el.attr_owned("message").unwrap_or_default(),
        file: file.to_string(),
        line: u32::try_from(el.attr_int("line")).unwrap_or(0),
        priority,
    }));
}
