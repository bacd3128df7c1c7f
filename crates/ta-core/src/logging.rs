//! Structured logging initialization for the Trust Authority client.
//!
//! Log level is controlled by the `RUST_LOG` environment variable; callers
//! that want JSON output for log aggregation should use [`init_json`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize human-readable logging. Defaults to `info` if `RUST_LOG` is unset.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialize JSON-structured logging, suitable for log aggregation systems.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();
}
