//! One build's worth of watching: wires the directory watcher and the report
//! processor together over a shared queue and shuts them down in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info};

use crate::config::{Config, ConfigManager};
use crate::error::{Result, WatchError};
use crate::parsers::{ParserFactory, ParserRegistry};
use crate::processor::{ProcessorSettings, ReportProcessor, RunSummary};
use crate::queue::ReportQueue;
use crate::sink::ReportingSink;
use crate::watcher::{DirectoryWatcher, FileFilter, WatchSummary};

/// Everything known once a session has shut down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub summary: RunSummary,
    pub watch: WatchSummary,
    /// Exceeded error/warning limits, already worded for the user
    pub violations: Vec<String>,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success() && self.violations.is_empty()
    }
}

pub struct WatchSession {
    config: Config,
    factory: ParserFactory,
    build_start: SystemTime,
}

impl WatchSession {
    /// Resolve the configured dialect. The build start defaults to now.
    pub fn new(config: Config, registry: &ParserRegistry) -> Result<Self> {
        let factory = *registry.get(&config.watch.dialect)?;
        let build_start = ConfigManager::get_build_start(&config).unwrap_or_else(SystemTime::now);
        Ok(Self {
            config,
            factory,
            build_start,
        })
    }

    pub fn with_build_start(mut self, build_start: SystemTime) -> Self {
        self.build_start = build_start;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn watcher(&self, queue: ReportQueue) -> Result<DirectoryWatcher> {
        let watch = &self.config.watch;
        let filter = FileFilter::new()
            .with_extensions(watch.extensions.clone())
            .with_include_patterns(&watch.include_patterns)?
            .with_exclude_patterns(&watch.exclude_patterns)?;
        Ok(
            DirectoryWatcher::new(watch.roots.clone(), queue, self.build_start)
                .with_filter(filter)
                .with_predicate(self.factory.predicate())
                .with_scan_interval(ConfigManager::get_scan_interval(&self.config)),
        )
    }

    /// Start both threads, block in `build_finished` until the build is over,
    /// then stop the watcher (after its final scan) before the processor.
    pub fn run<S, F>(self, sink: S, build_finished: F) -> Result<(SessionReport, S)>
    where
        S: ReportingSink + Send + 'static,
        F: FnOnce(),
    {
        let started = Instant::now();
        let queue = ReportQueue::new();
        let watcher = self.watcher(queue.clone())?;

        let mut settings = ProcessorSettings::from_config(&self.config);
        if settings.base_dir.is_none() {
            settings.base_dir = std::env::current_dir().ok();
        }
        let processor = ReportProcessor::new(&self.config.watch.dialect, self.factory, queue.clone(), sink)
            .with_settings(settings);

        let watcher_stop = Arc::new(AtomicBool::new(false));
        let processor_stop = Arc::new(AtomicBool::new(false));
        let watcher_handle = watcher.spawn(Arc::clone(&watcher_stop))?;
        let processor_handle = match processor.spawn(Arc::clone(&processor_stop)) {
            Ok(handle) => handle,
            Err(e) => {
                watcher_stop.store(true, Ordering::SeqCst);
                let _ = watcher_handle.join();
                return Err(e);
            }
        };
        info!(dialect = %self.config.watch.dialect, "build session started");

        build_finished();
        debug!("build finished, stopping watcher");

        watcher_stop.store(true, Ordering::SeqCst);
        let watched = join("report-watcher", watcher_handle);
        queue.close();

        processor_stop.store(true, Ordering::SeqCst);
        let (summary, sink) = join("report-processor", processor_handle)?;
        let watch = watched??;

        let processing = &self.config.processing;
        let violations = summary.limit_violations(processing.max_errors, processing.max_warnings);
        let report = SessionReport {
            summary,
            watch,
            violations,
            elapsed: started.elapsed(),
        };
        Ok((report, sink))
    }
}

fn join<T>(name: &str, handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|_| {
        WatchError::WorkerPanicked {
            name: name.to_string(),
        }
        .into()
    })
}
