//! Diagnostic output setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::VerbosityLevel;

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbosity: VerbosityLevel) -> &'static str {
    match verbosity {
        VerbosityLevel::Quiet => "warn",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
        VerbosityLevel::Debug => "trace",
    }
}

/// Install the global subscriber writing to stderr. A second call is a no-op.
pub fn init(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr)),
        )
        .try_init();
}
