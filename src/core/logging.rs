//! Diagnostic logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt};

use crate::core::config::LoggingConfig;

/// Install the global `tracing` subscriber, writing to stderr so that stdout
/// stays reserved for command output.
///
/// `RUST_LOG` wins over the configured level. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
