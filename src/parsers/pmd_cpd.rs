//! PMD copy/paste detector (`pmd-cpd`) duplication reports.

use std::collections::HashSet;

use crate::sink::{DuplicateFragment, FragmentLocation, ReportEvent};
use crate::xml_visitor::{ElementCursor, Rule, Visit};

use super::text::{java_hash_code, relative_path};
use super::{Dialect, ParsingResult, Walk};

#[derive(Debug, Default)]
pub struct PmdCpd {
    duplicate: Option<DuplicateFragment>,
    /// Fragment hashes handed out so far
    used_hashes: HashSet<i32>,
    duplicates: usize,
}

type W = Walk<PmdCpd>;

fn count(el: &ElementCursor, key: &str) -> u32 {
    u32::try_from(el.attr_int(key)).unwrap_or(0)
}

impl Dialect for PmdCpd {
    const TOOL: &'static str = "PMD CPD";
    const EXPECTED_ROOT: &'static str = "root \"pmd-cpd\" element not present";
    const COMPLETE_ROOTS: &'static [&'static str] = &["pmd-cpd"];

    fn unexpected_root_message() -> String {
        format!(
            "{}. Please check {} sources for the supported XML Schema",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    fn rules() -> Vec<Rule<W>> {
        vec![Rule::element("pmd-cpd", |w: &mut W, _: &ElementCursor| {
            w.out.push(ReportEvent::DuplicatesStarted);
            Visit::children_then(vec![duplication()], |w: &mut W| {
                w.out.push(ReportEvent::DuplicatesFinished)
            })
        })]
    }

    fn result(walk: &W) -> ParsingResult {
        ParsingResult {
            duplicates: walk.state.duplicates,
            ..Default::default()
        }
    }
}

fn duplication() -> Rule<W> {
    Rule::element("duplication", |w: &mut W, el: &ElementCursor| {
        w.state.duplicate = Some(DuplicateFragment {
            hash: 0,
            tokens: count(el, "tokens"),
            lines: count(el, "lines"),
            locations: Vec::new(),
        });
        Visit::children_then(
            vec![
                Rule::text(&["codefragment"], |w: &mut W, text| {
                    if let Some(duplicate) = w.state.duplicate.as_mut() {
                        duplicate.hash = java_hash_code(text.trim());
                    }
                }),
                Rule::element("file", |w: &mut W, el: &ElementCursor| {
                    let file = relative_path(w.base_dir.as_deref(), el.attr("path"));
                    let line = count(el, "line");
                    if let Some(duplicate) = w.state.duplicate.as_mut() {
                        duplicate.locations.push(FragmentLocation { file, line, hash: 0 });
                    }
                    Visit::skip()
                }),
            ],
            |w: &mut W| {
                if let Some(duplicate) = w.state.duplicate.take() {
                    duplicate_found(w, duplicate);
                }
            },
        )
    })
}

fn duplicate_found(w: &mut W, mut duplicate: DuplicateFragment) {
    for location in &mut duplicate.locations {
        let mut hash = java_hash_code(&format!(
            "{}{}{}",
            location.file, location.line, duplicate.hash
        ));
        while !w.state.used_hashes.insert(hash) {
            hash = hash.wrapping_add(1);
        }
        location.hash = hash;
    }
    w.state.duplicates += 1;
    w.out.push(ReportEvent::Duplicate(duplicate));
}
