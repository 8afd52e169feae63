//! Bookkeeping that lets a parser re-read a grown report without reporting
//! anything twice.
//!
//! Every event-producing occurrence in a document (suite start, test, message)
//! gets an ordinal in document order. Because a growing file only ever gains a
//! longer prefix, ordinals are stable between attempts, and an occurrence is
//! forwarded only when its ordinal is past the high-water mark of the previous
//! attempts.

use tracing::{debug, warn};

use crate::sink::{ReportEvent, ReportingSink, SuiteRecord, TestFailure};

/// Ordinal counter with a high-water mark that survives attempts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Replay {
    seen: usize,
    committed: usize,
}

impl Replay {
    /// Start counting from the beginning of the document again.
    pub fn restart(&mut self) {
        self.seen = 0;
    }

    /// Raise the high-water mark to at least `count`.
    pub fn resume_from(&mut self, count: usize) {
        self.committed = self.committed.max(count);
    }

    /// Count one occurrence; true when it has not been forwarded before.
    pub fn advance(&mut self) -> bool {
        let ordinal = self.seen;
        self.seen += 1;
        if ordinal >= self.committed {
            self.committed = ordinal + 1;
            true
        } else {
            false
        }
    }

    /// Ordinal the next occurrence will get
    pub fn next_ordinal(&self) -> usize {
        self.seen
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn committed(&self) -> usize {
        self.committed
    }
}

#[derive(Debug, Clone)]
struct OpenSuite {
    ordinal: usize,
    record: SuiteRecord,
}

/// Suite stack, test skip-count and message deduplication for one report
#[derive(Debug, Default)]
pub struct Emitter {
    tests: Replay,
    suites: Replay,
    messages: Replay,
    /// Nesting as seen by the current attempt
    stack: Vec<OpenSuite>,
    /// Suites opened at the sink and not yet closed there
    live: Vec<(usize, String)>,
    pending: Vec<ReportEvent>,
    failure: Option<String>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for a new pass over the document. `emitted` is the number of
    /// tests a previous pass already reported.
    pub fn begin_attempt(&mut self, emitted: usize) {
        self.tests.restart();
        self.tests.resume_from(emitted);
        self.suites.restart();
        self.messages.restart();
        self.stack.clear();
    }

    pub fn suite_found(&mut self, name: &str) {
        let ordinal = self.suites.next_ordinal();
        let fresh = self.suites.advance();
        self.stack.push(OpenSuite {
            ordinal,
            record: SuiteRecord::new(name),
        });
        if fresh {
            self.live.push((ordinal, name.to_string()));
            self.pending.push(ReportEvent::SuiteStarted { name: name.into() });
        }
    }

    /// Close the innermost suite. A name that does not match it is logged
    /// and otherwise ignored.
    pub fn suite_finished(&mut self, name: &str) {
        let Some(top) = self.stack.last() else {
            warn!(suite = name, "failed to log suite finish for not-opened suite");
            return;
        };
        if top.record.name != name {
            warn!(
                suite = name,
                open = %top.record.name,
                "failed to log suite finish for not-opened suite"
            );
            return;
        }
        let Some(suite) = self.stack.pop() else {
            return;
        };
        if let Some(pos) = self.live.iter().position(|(o, _)| *o == suite.ordinal) {
            self.live.remove(pos);
            debug!(
                suite = name,
                duration_ms = suite.record.duration_ms(),
                "suite finished"
            );
            self.pending.push(ReportEvent::SuiteFinished { name: name.into() });
        }
    }

    /// Name of the innermost open suite
    pub fn current_suite(&self) -> Option<&str> {
        self.stack.last().map(|s| s.record.name.as_str())
    }

    /// True when `name` is the innermost open suite.
    pub fn is_current(&self, name: &str) -> bool {
        self.current_suite() == Some(name)
    }

    /// Attach a failure to the innermost suite and surface it as an error.
    pub fn suite_failure(&mut self, name: &str, failure: TestFailure, message: String) {
        match self.stack.last_mut() {
            Some(top) if top.record.name == name => {
                top.record.failure.get_or_insert(failure);
                self.message(ReportEvent::error(message));
            }
            _ => warn!(suite = name, "failed to log suite failure for not-opened suite"),
        }
    }

    /// Forward a build message once per document position.
    pub fn message(&mut self, event: ReportEvent) {
        if self.messages.advance() {
            self.pending.push(event);
        }
    }

    /// Report a failure of the whole report; the first one is kept for the
    /// parsing result.
    pub fn failure(&mut self, message: String) {
        if self.failure.is_none() {
            self.failure = Some(message.clone());
        }
        self.message(ReportEvent::error(message));
    }

    /// Count one test; its events are forwarded only past the skip-count.
    pub fn test(&mut self, events: impl IntoIterator<Item = ReportEvent>) -> bool {
        let fresh = self.tests.advance();
        if fresh {
            self.pending.extend(events);
        }
        fresh
    }

    /// Queue an event that is not subject to deduplication.
    pub fn push(&mut self, event: ReportEvent) {
        self.pending.push(event);
    }

    /// Close every suite still open at the sink, innermost first.
    pub fn abnormal_end(&mut self) {
        while let Some((_, name)) = self.live.pop() {
            self.pending.push(ReportEvent::SuiteFinished { name });
        }
        self.stack.clear();
    }

    /// Deliver queued events to `sink`.
    pub fn flush(&mut self, sink: &mut dyn ReportingSink) {
        for event in self.pending.drain(..) {
            event.dispatch(sink);
        }
    }

    /// Tests reported so far, including those of earlier attempts
    pub fn tests_reported(&self) -> usize {
        self.tests.committed()
    }

    /// Tests counted by the current attempt
    pub fn tests_seen(&self) -> usize {
        self.tests.seen()
    }

    pub fn suites_reported(&self) -> usize {
        self.suites.committed()
    }

    pub fn open_suites(&self) -> usize {
        self.live.len()
    }

    pub fn captured_failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}
