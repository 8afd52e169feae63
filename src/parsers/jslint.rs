//! JSLint XML reports.

use crate::sink::{InspectionFinding, InspectionType, ReportEvent};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::{Dialect, ParsingResult, Tally, Walk};

const INSPECTION_ID: &str = "JSLint";
const PRIORITY: u8 = 2;

#[derive(Debug, Default)]
pub struct JsLint {
    type_reported: bool,
    tally: Tally,
}

type W = Walk<JsLint>;

impl Dialect for JsLint {
    const TOOL: &'static str = "JSLint";
    const EXPECTED_ROOT: &'static str = "\"jslint\" root element missing";
    const COMPLETE_ROOTS: &'static [&'static str] = &["jslint"];

    fn unexpected_root_message() -> String {
        format!(
            "{}. Please see {} sources for the supported format",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::path(&["jslint", "file"], |_: &mut W, el: &ElementCursor| {
            let file = el.attr_owned("name").unwrap_or_default();
            Visit::children(vec![Rule::element("issue", move |w: &mut W, el: &ElementCursor| {
                issue(w, &file, el);
                Visit::skip()
            })])
        })]
    }

    fn result(walk: &W) -> ParsingResult {
        walk.state.tally.result()
    }
}

fn issue(w: &mut W, file: &str, el: &ElementCursor) {
    if !w.state.type_reported {
        w.state.type_reported = true;
        w.out.push(ReportEvent::InspectionType(InspectionType {
            id: INSPECTION_ID.into(),
            name: INSPECTION_ID.into(),
            description: INSPECTION_ID.into(),
            category: INSPECTION_ID.into(),
        }));
    }
    w.state.tally.count(i64::from(PRIORITY));
    w.out.push(ReportEvent::Inspection(InspectionFinding {
        inspection_id: INSPECTION_ID.into(),
        message: message(el.attr("reason"), el.attr("evidence")),
        file: file.to_string(),
        line: u32::try_from(el.attr_int("line")).unwrap_or(0),
        priority: PRIORITY,
    }));
}

fn message(reason: Option<&str>, evidence: Option<&str>) -> String {
    let reason = reason.filter(|r| !r.is_empty());
    let evidence = evidence.filter(|e| !e.is_empty());
    match (reason, evidence) {
        (Some(reason), Some(evidence)) => format!(
            "REASON: {}, EVIDENCE: {evidence}",
            reason.strip_suffix('.').unwrap_or(reason)
        ),
        (Some(text), None) | (None, Some(text)) => text.to_string(),
        (None, None) => String::new(),
    }
}
