//! Tolerant, declarative XML traversal.
//!
//! A traversal is described as data: an ordered list of [`Rule`]s, each an
//! element pattern plus a handler. When an element starts, the first rule of
//! the enclosing level whose pattern matches runs its handler, which decides
//! what happens to the element's content by returning a [`Visit`]:
//!
//! * [`Visit::Children`] descends with a new rule list and an optional action
//!   that runs once the element's end tag has been read,
//! * [`Visit::Text`] collects the element's text and hands it over at the end
//!   tag,
//! * [`Visit::Skip`] ignores the whole subtree.
//!
//! Path rules that share leading element names are merged when a rule list
//! is built, so `["a", "b"]` and `["a", "c"]` both see their elements.
//!
//! Elements that match no rule are skipped. Running out of input in the
//! middle of the document is not an error: the walk stops and reports
//! [`Outcome::Truncated`]. Actions bound to end tags that were never read are
//! simply dropped, so a truncated walk only ever produces a prefix of what the
//! complete document produces.
//!
//! Handlers mutate an explicit context value `C` passed through the walk, so
//! rule lists hold no per-document state and can be rebuilt or reused freely.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{debug, trace};

use crate::error::{ParseError, ParseResult};

/// Element name matcher: literal local name or a regex over the whole name
#[derive(Clone)]
pub enum ElementPattern {
    Name(String),
    Regex(Regex),
}

impl ElementPattern {
    /// Compile a pattern which must match the complete local name.
    pub fn regex(pattern: &str) -> ParseResult<Self> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(ElementPattern::Regex)
            .map_err(|e| ParseError::InvalidPattern {
                pattern: pattern.to_string(),
                details: e.to_string(),
            })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            ElementPattern::Name(expected) => expected == name,
            ElementPattern::Regex(re) => re.is_match(name),
        }
    }
}

impl fmt::Debug for ElementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementPattern::Name(name) => write!(f, "<{name}>"),
            ElementPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

pub type ElementHandler<C> = Rc<dyn Fn(&mut C, &ElementCursor) -> Visit<C>>;
pub type EndAction<C> = Box<dyn FnOnce(&mut C)>;
pub type TextAction<C> = Box<dyn FnOnce(&mut C, String)>;

/// One entry of a rule list
pub struct Rule<C> {
    pattern: ElementPattern,
    action: RuleAction<C>,
}

enum RuleAction<C> {
    Handler(ElementHandler<C>),
    /// Intermediate element of a path: descend into the inner rules only
    Descend(Rc<[Rule<C>]>),
}

impl<C> Clone for RuleAction<C> {
    fn clone(&self) -> Self {
        match self {
            RuleAction::Handler(handler) => RuleAction::Handler(Rc::clone(handler)),
            RuleAction::Descend(inner) => RuleAction::Descend(Rc::clone(inner)),
        }
    }
}

impl<C> Clone for Rule<C> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            action: self.action.clone(),
        }
    }
}

impl<C> fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("pattern", &self.pattern).finish()
    }
}

impl<C: 'static> Rule<C> {
    pub fn new(
        pattern: ElementPattern,
        handler: impl Fn(&mut C, &ElementCursor) -> Visit<C> + 'static,
    ) -> Self {
        Self {
            pattern,
            action: RuleAction::Handler(Rc::new(handler)),
        }
    }

    /// Rule for a single element name.
    pub fn element(
        name: &str,
        handler: impl Fn(&mut C, &ElementCursor) -> Visit<C> + 'static,
    ) -> Self {
        Self::new(ElementPattern::Name(name.to_string()), handler)
    }

    /// Rule for a chain of nested elements; `handler` runs on the innermost
    /// one. Every intermediate element only descends.
    pub fn path(
        names: &[&str],
        handler: impl Fn(&mut C, &ElementCursor) -> Visit<C> + 'static,
    ) -> Self {
        let handler: ElementHandler<C> = Rc::new(handler);
        Self::path_with(names, handler)
    }

    fn path_with(names: &[&str], handler: ElementHandler<C>) -> Self {
        match names {
            [] | [_] => Self {
                pattern: ElementPattern::Name(names.first().copied().unwrap_or_default().to_string()),
                action: RuleAction::Handler(handler),
            },
            [first, rest @ ..] => Self {
                pattern: ElementPattern::Name(first.to_string()),
                action: RuleAction::Descend(Rc::from(vec![Self::path_with(rest, handler)])),
            },
        }
    }

    /// Rule whose innermost element delivers its text to `action`.
    pub fn text(names: &[&str], action: impl Fn(&mut C, String) + 'static) -> Self {
        let action = Rc::new(action);
        Self::path(names, move |_, _| {
            let action = Rc::clone(&action);
            Visit::text(move |ctx, text| action(ctx, text))
        })
    }

    pub fn pattern(&self) -> &ElementPattern {
        &self.pattern
    }
}

impl<C> Rule<C> {
    fn enter(&self, ctx: &mut C, cursor: &ElementCursor) -> Visit<C> {
        match &self.action {
            RuleAction::Handler(handler) => handler(ctx, cursor),
            RuleAction::Descend(inner) => Visit::Children {
                rules: inner.to_vec(),
                on_end: None,
            },
        }
    }

    /// Name of the element this rule only descends through, if it is one.
    fn descent_name(&self) -> Option<&str> {
        match (&self.pattern, &self.action) {
            (ElementPattern::Name(name), RuleAction::Descend(_)) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Fold path rules with the same leading element into one descent, keeping
/// the position of the first. Inner rule lists are merged the same way.
fn merge_paths<C>(rules: Vec<Rule<C>>) -> Vec<Rule<C>> {
    let mut merged: Vec<Rule<C>> = Vec::with_capacity(rules.len());
    for rule in rules {
        let target = rule.descent_name().and_then(|name| {
            merged
                .iter()
                .position(|seen| seen.descent_name() == Some(name))
        });
        match (target, rule.action) {
            (Some(index), RuleAction::Descend(inner)) => {
                if let RuleAction::Descend(existing) = &mut merged[index].action {
                    let combined: Vec<Rule<C>> = existing.iter().chain(inner.iter()).cloned().collect();
                    *existing = Rc::from(merge_paths(combined));
                }
            }
            (_, action) => merged.push(Rule {
                pattern: rule.pattern,
                action,
            }),
        }
    }
    merged
}

/// What to do with the content of a matched element
pub enum Visit<C> {
    Children {
        rules: Vec<Rule<C>>,
        on_end: Option<EndAction<C>>,
    },
    Text(TextAction<C>),
    Skip,
}

impl<C> Visit<C> {
    pub fn children(rules: Vec<Rule<C>>) -> Self {
        Visit::Children {
            rules: merge_paths(rules),
            on_end: None,
        }
    }

    /// Descend, then run `on_end` once the element is fully read.
    pub fn children_then(rules: Vec<Rule<C>>, on_end: impl FnOnce(&mut C) + 'static) -> Self {
        Visit::Children {
            rules: merge_paths(rules),
            on_end: Some(Box::new(on_end)),
        }
    }

    pub fn text(action: impl FnOnce(&mut C, String) + 'static) -> Self {
        Visit::Text(Box::new(action))
    }

    pub fn skip() -> Self {
        Visit::Skip
    }
}

/// Read-only view of the element a handler was invoked for
#[derive(Debug, Clone, Default)]
pub struct ElementCursor {
    name: String,
    attributes: Vec<(String, String)>,
}

impl ElementCursor {
    pub fn new(name: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .with_checks(false)
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                };
                (key, value)
            })
            .collect();
        Self { name, attributes }
    }

    /// Local name of the element (namespace prefix removed)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value as an owned string, if present
    pub fn attr_owned(&self, key: &str) -> Option<String> {
        self.attr(key).map(str::to_string)
    }

    /// Integer attribute; absent or malformed values read as 0
    pub fn attr_int(&self, key: &str) -> i64 {
        self.attr(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Java-style boolean attribute: only a case-insensitive "true" is true
    pub fn attr_bool(&self, key: &str) -> bool {
        self.attr(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// How a traversal ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The root element's end tag was read
    Complete,
    /// Input ended (or became unreadable) before the root element closed
    Truncated,
    /// The first element matched none of the root rules
    UnexpectedRoot(String),
}

enum Frame<C> {
    Children {
        rules: Vec<Rule<C>>,
        on_end: Option<EndAction<C>>,
    },
    Text {
        text: String,
        action: TextAction<C>,
    },
    Skip,
}

impl<C> Frame<C> {
    fn from_visit(visit: Visit<C>) -> Self {
        match visit {
            Visit::Children { rules, on_end } => Frame::Children { rules, on_end },
            Visit::Text(action) => Frame::Text {
                text: String::new(),
                action,
            },
            Visit::Skip => Frame::Skip,
        }
    }
}

/// Walk `bytes` with `roots` as the rule list for the document element.
pub fn visit<C>(bytes: &[u8], roots: &[Rule<C>], ctx: &mut C) -> Outcome {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    config.expand_empty_elements = true;
    config.trim_text(false);

    let roots = merge_paths(roots.to_vec());
    let mut stack: Vec<Frame<C>> = Vec::new();
    let mut root_seen = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                debug!(
                    position = reader.buffer_position(),
                    error = %e,
                    "stopping at unreadable XML, treating the document as truncated"
                );
                return Outcome::Truncated;
            }
        };

        match event {
            Event::Start(start) => {
                let cursor = ElementCursor::from_start(&start);
                let frame = if !root_seen {
                    root_seen = true;
                    match find_rule(&roots, cursor.name()) {
                        Some(rule) => Frame::from_visit(rule.enter(ctx, &cursor)),
                        None => return Outcome::UnexpectedRoot(cursor.name().to_string()),
                    }
                } else {
                    match stack.last() {
                        Some(Frame::Children { rules, .. }) => match find_rule(rules, cursor.name()) {
                            Some(rule) => Frame::from_visit(rule.enter(ctx, &cursor)),
                            None => {
                                trace!(element = cursor.name(), "no rule matched, skipping");
                                Frame::Skip
                            }
                        },
                        Some(Frame::Text { .. }) | Some(Frame::Skip) => Frame::Skip,
                        None => {
                            // Second top-level element after the root closed
                            return Outcome::Complete;
                        }
                    }
                };
                stack.push(frame);
            }
            Event::End(_) => {
                match stack.pop() {
                    Some(Frame::Children {
                        on_end: Some(on_end),
                        ..
                    }) => on_end(ctx),
                    Some(Frame::Text { text, action }) => action(ctx, text),
                    _ => {}
                }
                if root_seen && stack.is_empty() {
                    return Outcome::Complete;
                }
            }
            Event::Text(text) => {
                if let Some(Frame::Text { text: buffer, .. }) = stack.last_mut() {
                    let chunk = match text.unescape() {
                        Ok(chunk) => chunk,
                        Err(_) => Cow::Owned(String::from_utf8_lossy(&text).into_owned()),
                    };
                    buffer.push_str(&chunk);
                }
            }
            Event::CData(data) => {
                if let Some(Frame::Text { text: buffer, .. }) = stack.last_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => return Outcome::Truncated,
            _ => {}
        }
    }
}

fn find_rule<'r, C>(rules: &'r [Rule<C>], name: &str) -> Option<&'r Rule<C>> {
    rules.iter().find(|rule| rule.pattern.matches(name))
}

/// True when `bytes` hold a document whose root element is `root` and whose
/// root end tag has been written.
pub fn is_report_complete(bytes: &[u8], root: &str) -> bool {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().expand_empty_elements = true;

    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if depth == 0 && start.local_name().as_ref() != root.as_bytes() {
                    return false;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return true;
                }
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

/// Local name of the document element, once its start tag has been written.
pub fn root_name(bytes: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(bytes);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
