//! Polling directory watcher.
//!
//! Every scan lists the files directly under each watched root and enqueues
//! the ones written by the current build that were not enqueued before.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use globset::{GlobSet, GlobSetBuilder};
use tracing::{debug, info, trace, warn};

use crate::error::{ReportError, Result};
use crate::parsers::non_empty;
use crate::queue::{ReportFile, ReportQueue};

/// Extension and glob filter for report file names
#[derive(Debug, Clone)]
pub struct FileFilter {
    /// File extensions to include (e.g., ["xml", "trx"])
    extensions: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFilter {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_set: None,
            exclude_set: None,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_include_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.include_set = build_glob_set(patterns, "include")?;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude_set = build_glob_set(patterns, "exclude")?;
        Ok(self)
    }

    /// Check if a file should be reported based on extension and patterns.
    /// Patterns match either the file name or the whole path.
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        let matches = |set: &GlobSet| {
            set.is_match(path) || path.file_name().is_some_and(|name| set.is_match(name))
        };

        if self.exclude_set.as_ref().is_some_and(matches) {
            return false;
        }
        self.include_set.as_ref().is_none_or(matches)
    }
}

fn build_glob_set(patterns: &[String], kind: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ReportError::Config(format!("Invalid glob pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| ReportError::Config(format!("Failed to build {kind} glob set: {e}")))?;
    Ok(Some(set))
}

/// Why a root produced no reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStatus {
    Active,
    Missing,
    NotADirectory,
    /// The directory holds no files at all
    Empty,
    /// The directory holds files, but none qualified
    NoMatchingFiles,
}

impl RootStatus {
    fn describe(self, root: &Path) -> String {
        let root = root.display();
        match self {
            RootStatus::Active => format!("{root}: report files found"),
            RootStatus::Missing => format!("{root} does not exist"),
            RootStatus::NotADirectory => format!("{root} is not a directory"),
            RootStatus::Empty => format!("{root}: no files found"),
            RootStatus::NoMatchingFiles => format!("{root} couldn't find any matching files"),
        }
    }
}

/// What the watcher did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub scans: usize,
    pub enqueued: usize,
    pub roots: Vec<(PathBuf, RootStatus)>,
}

/// Watches a set of root directories and feeds a [`ReportQueue`]
#[derive(Debug)]
pub struct DirectoryWatcher {
    roots: Vec<PathBuf>,
    active: HashMap<PathBuf, usize>,
    filter: FileFilter,
    looks_parseable: fn(&Path, u64) -> bool,
    build_start: SystemTime,
    scan_interval: Duration,
    /// Paths already enqueued; never enqueued again
    seen: HashSet<PathBuf>,
    queue: ReportQueue,
    scans: usize,
}

impl DirectoryWatcher {
    pub fn new(roots: Vec<PathBuf>, queue: ReportQueue, build_start: SystemTime) -> Self {
        Self {
            roots,
            active: HashMap::new(),
            filter: FileFilter::new(),
            looks_parseable: non_empty,
            build_start,
            scan_interval: Duration::from_millis(100),
            seen: HashSet::new(),
            queue,
            scans: 0,
        }
    }

    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Dialect predicate deciding whether a file is worth enqueueing
    pub fn with_predicate(mut self, looks_parseable: fn(&Path, u64) -> bool) -> Self {
        self.looks_parseable = looks_parseable;
        self
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// List every root once and enqueue qualifying files. Returns the number
    /// of files enqueued by this scan.
    pub fn scan(&mut self) -> Result<usize> {
        self.scans += 1;
        let mut enqueued = 0;
        for root in self.roots.clone() {
            let entries = match fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(e) => {
                    trace!(root = %root.display(), error = %e, "root cannot be listed yet");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if self.seen.contains(&path) || !self.qualifies(&path) {
                    continue;
                }
                self.queue.put(ReportFile::new(path.clone(), root.clone()))?;
                debug!(path = %path.display(), "report file found");
                self.seen.insert(path);
                *self.active.entry(root.clone()).or_default() += 1;
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    fn qualifies(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };
        if !metadata.is_file() || !self.filter.should_process(path) {
            return false;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified <= self.build_start {
            trace!(path = %path.display(), "skipping file older than the build");
            return false;
        }
        fs::File::open(path).is_ok() && (self.looks_parseable)(path, metadata.len())
    }

    /// Scan until `stop` is raised, then scan exactly once more.
    pub fn run(mut self, stop: &AtomicBool) -> Result<WatchSummary> {
        info!(roots = self.roots.len(), "watching for reports");
        while !stop.load(Ordering::SeqCst) {
            self.scan()?;
            thread::sleep(self.scan_interval);
        }
        self.scan()?;
        Ok(self.finish())
    }

    /// Run the watch loop on its own thread.
    pub fn spawn(self, stop: Arc<AtomicBool>) -> Result<JoinHandle<Result<WatchSummary>>> {
        thread::Builder::new()
            .name("report-watcher".into())
            .spawn(move || self.run(&stop))
            .map_err(ReportError::from)
    }

    /// Report each root that never produced a file, and finish.
    pub fn finish(self) -> WatchSummary {
        let roots = self.log_totals();
        let enqueued = self.seen.len();
        debug!(scans = self.scans, enqueued, "watcher stopped");
        WatchSummary {
            scans: self.scans,
            enqueued,
            roots,
        }
    }

    pub fn log_totals(&self) -> Vec<(PathBuf, RootStatus)> {
        self.roots
            .iter()
            .map(|root| {
                let status = self.status(root);
                match status {
                    RootStatus::Active => {
                        let found = self.active.get(root).copied().unwrap_or_default();
                        info!(root = %root.display(), "{found} file(s) found");
                    }
                    _ => warn!("{}", status.describe(root)),
                }
                (root.clone(), status)
            })
            .collect()
    }

    fn status(&self, root: &Path) -> RootStatus {
        if self.active.contains_key(root) {
            return RootStatus::Active;
        }
        match fs::metadata(root) {
            Err(_) => RootStatus::Missing,
            Ok(metadata) if !metadata.is_dir() => RootStatus::NotADirectory,
            Ok(_) => match fs::read_dir(root).map(|mut entries| entries.next().is_none()) {
                Ok(true) => RootStatus::Empty,
                _ => RootStatus::NoMatchingFiles,
            },
        }
    }
}
