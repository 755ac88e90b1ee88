//! Process-wide tracing setup shared by the service binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, LoggingConfig};

/// Initialize tracing with JSON output and `RUST_LOG` filtering (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&LoggingConfig::default());
}

/// Initialize tracing from explicit settings.
pub fn init_with(config: &LoggingConfig) {
    tracing::init(config);
}
