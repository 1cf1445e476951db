//! Tracing subscriber setup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Build the log filter: `RUST_LOG` when set and valid, otherwise `level`.
///
/// An unrecognised `level` falls back to `info`.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level))
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, logging to stderr.
///
/// Call once, at startup.
pub fn init(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter(level))
        .init();
}
