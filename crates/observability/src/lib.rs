//! Process-wide logging setup shared by binaries, tests and benches.

/// Tracing configuration (filters, formatting).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(LogFormat::Json, "info");
}

/// Human-readable logs, for tests and local runs.
pub fn init_pretty(default_filter: &str) {
    tracing::init_with(LogFormat::Pretty, default_filter);
}
