//! Report dialect parsers.
//!
//! Every dialect is a [`Dialect`]: a set of visitor rules over a per-attempt
//! state value plus a few constants. [`DialectParser`] turns a dialect into a
//! [`FormatParser`], the object the processor drives repeatedly while a
//! report file is still being written.

pub mod checkstyle;
pub mod ctest;
pub mod findbugs;
pub mod jslint;
pub mod junit;
pub mod nunit;
pub mod pmd;
pub mod pmd_cpd;
pub mod testng;
pub mod text;
pub mod tracker;
pub mod trx;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{ParseError, ReportError, Result};
use crate::sink::ReportingSink;
use crate::xml_visitor::{self, Outcome, Rule};

pub use tracker::Emitter;

/// The bytes of a report file as read by one attempt
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub path: &'a Path,
    pub bytes: &'a [u8],
}

impl<'a> Snapshot<'a> {
    pub fn new(path: &'a Path, bytes: &'a [u8]) -> Self {
        Self { path, bytes }
    }

    /// Path used in user-facing messages
    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Totals of one parsed report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsingResult {
    pub suites: usize,
    pub tests: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub duplicates: usize,
    pub failure: Option<String>,
}

impl ParsingResult {
    /// Add the totals of `other`; the first captured failure is kept.
    pub fn accumulate(&mut self, other: &ParsingResult) {
        self.suites += other.suites;
        self.tests += other.tests;
        self.errors += other.errors;
        self.warnings += other.warnings;
        self.infos += other.infos;
        self.duplicates += other.duplicates;
        if self.failure.is_none() {
            self.failure.clone_from(&other.failure);
        }
    }

    pub fn inspections(&self) -> usize {
        self.errors + self.warnings + self.infos
    }
}

/// Inspection counts by priority: 1 is an error, 2 a warning, anything
/// else informational
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl Tally {
    pub fn count(&mut self, priority: i64) {
        match priority {
            1 => self.errors += 1,
            2 => self.warnings += 1,
            _ => self.infos += 1,
        }
    }

    pub fn result(&self) -> ParsingResult {
        ParsingResult {
            errors: self.errors,
            warnings: self.warnings,
            infos: self.infos,
            ..Default::default()
        }
    }
}

/// Result of one parse attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The document is not finished yet; `emitted` tests have been reported
    Incomplete { emitted: usize },
    Done(ParsingResult),
    /// The document can never be parsed by this dialect
    Failed(ParseError),
}

/// A parser bound to one report file
pub trait FormatParser {
    /// Parse the current content. `emitted` is the count returned by the
    /// previous attempt on the same file.
    fn parse(
        &mut self,
        snapshot: &Snapshot<'_>,
        emitted: usize,
        sink: &mut dyn ReportingSink,
    ) -> ParseOutcome;

    /// Leave the sink consistent for a report that will never be finished.
    fn abnormal_end(&mut self, sink: &mut dyn ReportingSink);

    fn parsing_result(&self) -> ParsingResult;
}

/// Traversal context handed to every rule handler of a dialect
#[derive(Debug, Default)]
pub struct Walk<S> {
    pub out: Emitter,
    pub state: S,
    /// Report path for messages
    pub file: String,
    /// Directory that reported source paths are made relative to
    pub base_dir: Option<String>,
}

/// Static description of a report dialect
pub trait Dialect: Default + Sized + 'static {
    /// Tool whose documentation describes the format
    const TOOL: &'static str;

    /// Explanation used when the document element is wrong
    const EXPECTED_ROOT: &'static str;

    /// Document elements of dialects that are only read once fully
    /// written; empty for dialects reported while the file grows
    const COMPLETE_ROOTS: &'static [&'static str] = &[];

    fn rules() -> Vec<Rule<Walk<Self>>>;

    /// Full message for a document with the wrong root element
    fn unexpected_root_message() -> String {
        format!(
            "{}\nPlease check {} binaries for the supported DTD",
            Self::EXPECTED_ROOT,
            Self::TOOL
        )
    }

    /// Traverse the document. Dialects needing more than one pass override
    /// this.
    fn walk(bytes: &[u8], walk: &mut Walk<Self>) -> Outcome {
        xml_visitor::visit(bytes, &Self::rules(), walk)
    }

    /// Runs after a complete traversal, before events reach the sink.
    fn finish(_walk: &mut Walk<Self>) {}

    fn result(walk: &Walk<Self>) -> ParsingResult {
        ParsingResult {
            suites: walk.out.suites_reported(),
            tests: walk.out.tests_reported(),
            failure: walk.out.captured_failure().map(str::to_string),
            ..Default::default()
        }
    }
}

/// [`FormatParser`] for any [`Dialect`]
#[derive(Debug, Default)]
pub struct DialectParser<D: Dialect> {
    walk: Walk<D>,
}

impl<D: Dialect> DialectParser<D> {
    pub fn new() -> Self {
        Self {
            walk: Walk::default(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: Option<&Path>) -> Self {
        self.walk.base_dir = base_dir.map(|dir| dir.to_string_lossy().into_owned());
        self
    }

    fn unexpected(found: String) -> ParseError {
        ParseError::UnexpectedRoot {
            found,
            expected: D::unexpected_root_message(),
        }
    }
}

impl<D: Dialect> FormatParser for DialectParser<D> {
    fn parse(
        &mut self,
        snapshot: &Snapshot<'_>,
        emitted: usize,
        sink: &mut dyn ReportingSink,
    ) -> ParseOutcome {
        if !D::COMPLETE_ROOTS.is_empty() {
            match xml_visitor::root_name(snapshot.bytes) {
                Some(found) if !D::COMPLETE_ROOTS.contains(&found.as_str()) => {
                    return ParseOutcome::Failed(Self::unexpected(found));
                }
                Some(found) if xml_visitor::is_report_complete(snapshot.bytes, &found) => {}
                _ => return ParseOutcome::Incomplete { emitted },
            }
        }

        self.walk.file = snapshot.display_name();
        self.walk.state = D::default();
        self.walk.out.begin_attempt(emitted);

        let outcome = D::walk(snapshot.bytes, &mut self.walk);
        if outcome == Outcome::Complete {
            D::finish(&mut self.walk);
        }
        self.walk.out.flush(sink);

        match outcome {
            Outcome::Complete => ParseOutcome::Done(D::result(&self.walk)),
            Outcome::Truncated => {
                debug!(
                    file = %self.walk.file,
                    tests = self.walk.out.tests_reported(),
                    "report is not complete yet"
                );
                ParseOutcome::Incomplete {
                    emitted: self.walk.out.tests_reported(),
                }
            }
            Outcome::UnexpectedRoot(found) => ParseOutcome::Failed(Self::unexpected(found)),
        }
    }

    fn abnormal_end(&mut self, sink: &mut dyn ReportingSink) {
        self.walk.out.abnormal_end();
        self.walk.out.flush(sink);
    }

    fn parsing_result(&self) -> ParsingResult {
        D::result(&self.walk)
    }
}

/// Default predicate for whether a discovered file is worth enqueueing
pub fn non_empty(_path: &Path, len: u64) -> bool {
    len > 0
}

/// Constructor capability for one dialect key
#[derive(Clone, Copy)]
pub struct ParserFactory {
    build: fn(Option<&Path>) -> Box<dyn FormatParser>,
    looks_parseable: fn(&Path, u64) -> bool,
}

impl ParserFactory {
    pub fn new(build: fn(Option<&Path>) -> Box<dyn FormatParser>) -> Self {
        Self {
            build,
            looks_parseable: non_empty,
        }
    }

    pub fn with_predicate(mut self, looks_parseable: fn(&Path, u64) -> bool) -> Self {
        self.looks_parseable = looks_parseable;
        self
    }

    pub fn create(&self) -> Box<dyn FormatParser> {
        (self.build)(None)
    }

    /// Parser whose reported paths are relative to `base_dir`
    pub fn create_in(&self, base_dir: Option<&Path>) -> Box<dyn FormatParser> {
        (self.build)(base_dir)
    }

    pub fn looks_parseable(&self, path: &Path, len: u64) -> bool {
        (self.looks_parseable)(path, len)
    }

    pub fn predicate(&self) -> fn(&Path, u64) -> bool {
        self.looks_parseable
    }
}

impl std::fmt::Debug for ParserFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserFactory").finish_non_exhaustive()
    }
}

fn boxed<D: Dialect>(base_dir: Option<&Path>) -> Box<dyn FormatParser> {
    Box::new(DialectParser::<D>::new().with_base_dir(base_dir))
}

/// Dialect key to parser constructor
#[derive(Debug, Clone, Default)]
pub struct ParserRegistry {
    factories: BTreeMap<String, ParserFactory>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in dialect
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for key in ["junit", "surefire", "gtest"] {
            registry.register(key, ParserFactory::new(boxed::<junit::JUnit>));
        }
        registry.register("nunit", ParserFactory::new(boxed::<nunit::NUnit>));
        registry.register("testng", ParserFactory::new(boxed::<testng::TestNg>));
        registry.register("mstest", ParserFactory::new(boxed::<trx::Trx<trx::MsTest>>));
        registry.register("vstest", ParserFactory::new(boxed::<trx::Trx<trx::VsTest>>));
        registry.register("trx", ParserFactory::new(boxed::<trx::Trx<trx::TrxSuite>>));
        registry.register("ctest", ParserFactory::new(boxed::<ctest::CTest>));
        registry.register("findBugs", ParserFactory::new(boxed::<findbugs::FindBugs>));
        registry.register("pmdCpd", ParserFactory::new(boxed::<pmd_cpd::PmdCpd>));
        registry.register("jslint", ParserFactory::new(boxed::<jslint::JsLint>));
        registry.register("checkstyle", ParserFactory::new(boxed::<checkstyle::Checkstyle>));
        registry.register("pmd", ParserFactory::new(boxed::<pmd::Pmd>));
        registry
    }

    pub fn register(&mut self, key: &str, factory: ParserFactory) {
        self.factories.insert(key.to_string(), factory);
    }

    pub fn get(&self, key: &str) -> Result<&ParserFactory> {
        self.factories
            .get(key)
            .ok_or_else(|| ReportError::UnknownDialect {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
