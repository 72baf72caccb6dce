//! # relay-logging
//!
//! Structured logging with `tracing` for the relay server.
//!
//! - [`LogLevel`] and [`LogFormat`] parsed leniently from settings strings
//! - [`build_env_filter`] where `RUST_LOG` overrides the configured level
//! - [`init_subscriber`] for installing the global subscriber

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Build the level filter. `RUST_LOG` wins over `level` when it is set and valid.
pub fn build_env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()))
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    let filter = build_env_filter(level);

    // try_init is a no-op if a global default is already set
    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact();
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
