//! Tracing setup for the CLI

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber
///
/// `--verbose` forces debug; otherwise `RUST_LOG` applies, defaulting to
/// warnings only so that log lines do not drown the progress output.
/// Logs go to stderr, pretty on a terminal and JSON otherwise.
pub fn init(verbose: bool) {
    let filter_layer = if verbose {
        EnvFilter::new(Level::DEBUG.as_str())
    } else {
        EnvFilter::builder()
            .with_default_directive(Level::WARN.into())
            .from_env_lossy()
    };

    let fmt_layer = if std::io::stderr().is_terminal() {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    };

    // A subscriber may already be set when running under a test harness
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init();
}
