//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Compact single-line text.
    Pretty,
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(format: LogFormat, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // A subscriber may already be installed (another test, the host binary).
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.compact().with_test_writer().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_with(LogFormat::Json, "info");
        init_with(LogFormat::Pretty, "debug");
        ::tracing::info!(answer = 42, "still logging");
    }
}
