use std::io;
use std::process;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, error};

use xml_report_watcher::{
    Cli, ConfigManager, JsonLinesSink, LoggingSink, Output, OutputFormat, ParserRegistry,
    ReportingSink, SessionReport, WatchSession, logging,
};

fn main() {
    let cli = Cli::parse_args();
    let cli_verbosity = cli.verbosity();

    match run(cli) {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            // No-op when the configured filter is already installed
            logging::init(cli_verbosity);
            error!("{e:#}");
            process::exit(2);
        }
    }
}

/// Returns whether the build's reports were all processed within limits.
fn run(cli: Cli) -> Result<bool> {
    let registry = ParserRegistry::with_builtin();

    if cli.list_dialects {
        let mut keys: Vec<_> = registry.keys().collect();
        keys.sort_unstable();
        for key in keys {
            println!("{key}");
        }
        return Ok(true);
    }

    let config = ConfigManager::load_config(&cli, &registry).context("Failed to load configuration")?;
    let verbosity = config.output.verbosity();
    logging::init(verbosity);
    debug!(?config, "configuration loaded");

    let format = cli.output_format.unwrap_or_else(|| config.output.format.into());

    let mut session = WatchSession::new(config, &registry).context("Failed to start watching")?;
    if cli.once && cli.since.is_none() && session.config().watch.build_start.is_none() {
        // Nothing is written after a one-shot scan starts, so take every existing file.
        session = session.with_build_start(SystemTime::UNIX_EPOCH);
    }

    let once = cli.once;
    let duration = cli.duration_secs.map(Duration::from_secs);
    let build_finished = move || wait_for_build(once, duration);

    let report = match format {
        OutputFormat::Human => execute(session, LoggingSink, build_finished)?,
        OutputFormat::Json => execute(session, JsonLinesSink::new(io::stdout()), build_finished)?,
    };

    let output = Output::new(verbosity, format);
    let summary = output.format_results(&report.summary, &report.watch, &report.violations, report.elapsed);
    if !summary.is_empty() {
        println!("{}", summary.trim_end());
    }
    Ok(report.is_success())
}

fn execute<S, F>(session: WatchSession, sink: S, build_finished: F) -> Result<SessionReport>
where
    S: ReportingSink + Send + 'static,
    F: FnOnce(),
{
    let (report, _) = session
        .run(sink, build_finished)
        .context("Report watching failed")?;
    Ok(report)
}

/// Block until the build is over: immediately for `--once`, after the given
/// duration, or when stdin is closed.
fn wait_for_build(once: bool, duration: Option<Duration>) {
    if once {
        return;
    }
    if let Some(duration) = duration {
        thread::sleep(duration);
        return;
    }
    if let Err(e) = io::copy(&mut io::stdin().lock(), &mut io::sink()) {
        debug!(error = %e, "stdin closed with an error");
    }
}
