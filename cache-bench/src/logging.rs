//! Structured logging initialization.
//!
//! The RUST_LOG environment variable takes precedence over the configured
//! level.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber. Logs go to stderr; the periodic
/// report owns stdout.
pub fn init(config: &LoggingConfig) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_str())
    };

    match config.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_thread_names(config.thread_names),
            );
            subscriber.init();
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_thread_names(config.thread_names),
            );
            subscriber.init();
        }
    }
}
