//! Logging setup.
//!
//! Structured logging through the tracing crate, configured from
//! [`LoggingSettings`](crate::config::LoggingSettings). The `RUST_LOG`
//! environment variable overrides the configured level filter.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the global tracing subscriber.
///
/// Host processes call this once at startup. Repeat calls (and calls after
/// the host installed its own subscriber) are no-ops, so embedding the
/// framework in a process that already logs is safe.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json_format {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init();
    }
}
