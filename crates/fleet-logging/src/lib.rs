//! # fleet-logging
//!
//! Structured logging with `tracing`.
//!
//! One-shot subscriber initialization for the fleet binaries: env-filter
//! driven levels (`RUST_LOG` wins over the configured default) and an
//! optional JSON output format for log shippers.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised during logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Install the global tracing subscriber.
///
/// `default_filter` is any `EnvFilter` directive string (e.g. `"info"` or
/// `"fleet_coordination=debug,info"`); the `RUST_LOG` environment variable
/// takes precedence when set. With `json` the subscriber emits one JSON
/// object per line.
pub fn init(default_filter: &str, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_init_reports_already_initialized() {
        // First call may or may not win depending on test ordering across the
        // process; the second is guaranteed to fail.
        let _ = init("info", false);
        let err = init("info", false).unwrap_err();
        assert!(err.to_string().contains("already initialized"));
    }
}
