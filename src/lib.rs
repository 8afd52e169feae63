//! # xml-report-watcher Library
//!
//! Watches build output directories for XML test and inspection reports and
//! turns them into a stream of normalized reporting events while they are
//! still being written. Each report is parsed repeatedly as it grows; events
//! already emitted by an earlier attempt are never emitted again.

pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod output;
pub mod parsers;
pub mod processor;
pub mod queue;
pub mod session;
pub mod sink;
pub mod watcher;
pub mod xml_visitor;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use error::{ParseError, ReportError, WatchError};
pub use output::Output;
pub use parsers::{FormatParser, ParseOutcome, ParserFactory, ParserRegistry, ParsingResult, Snapshot};
pub use processor::{ProcessorSettings, ReportProcessor, RunSummary};
pub use queue::{ReportFile, ReportQueue};
pub use session::{SessionReport, WatchSession};
pub use sink::{JsonLinesSink, LoggingSink, RecordingSink, ReportEvent, ReportingSink};
pub use watcher::{DirectoryWatcher, FileFilter, RootStatus, WatchSummary};
