//! PMD XML renderer reports.

use crate::sink::{InspectionFinding, InspectionType, ReportEvent};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::{Dialect, ParsingResult, Tally, Walk};

#[derive(Debug, Default)]
pub struct Pmd {
    tally: Tally,
}

type W = Walk<Pmd>;

impl Dialect for Pmd {
    const TOOL: &'static str = "PMD";
    const EXPECTED_ROOT: &'static str = "\"pmd\" root element missing";
    const COMPLETE_ROOTS: &'static [&'static str] = &["pmd"];

    fn unexpected_root_message() -> String {
        format!(
            "{}. Please check {} sources for the supported XML Schema",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::path(&["pmd", "file"], |_: &mut W, el: &ElementCursor| {
            let file = el.attr_owned("name").unwrap_or_default();
            Visit::children(vec![Rule::element("violation", move |w: &mut W, el: &ElementCursor| {
                violation(w, file.clone(), el)
            })])
        })]
    }

    fn result(walk: &W) -> ParsingResult {
        walk.state.tally.result()
    }
}

fn violation(w: &mut W, file: String, el: &ElementCursor) -> Visit<W> {
    let rule = el.attr("rule").unwrap_or_default().to_string();
    let ruleset = el.attr("ruleset").unwrap_or_default().to_string();
    let line = u32::try_from(el.attr_int("beginline")).unwrap_or(0);
    let priority = el.attr_int("priority");

    w.out.push(ReportEvent::InspectionType(InspectionType {
        id: rule.clone(),
        name: rule.clone(),
        description: ruleset.clone(),
        category: ruleset,
    }));
    Visit::text(move |w: &mut W, text| {
        w.state.tally.count(priority);
        w.out.push(ReportEvent::Inspection(InspectionFinding {
            inspection_id: rule,
            message: text.trim().to_string(),
            file,
            line,
            priority: u8::try_from(priority).unwrap_or(u8::MAX),
        }));
    })
}
