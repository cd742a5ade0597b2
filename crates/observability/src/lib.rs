//! Tracing/logging setup and the tracing-backed telemetry sink.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

/// Telemetry sink that forwards flushed events to `tracing`.
pub mod telemetry;

pub use self::telemetry::TracingTelemetrySink;
pub use self::tracing::{LogFormat, init_with};
