use keystone_events::{TelemetryEvent, TelemetrySink};

/// Emits every flushed telemetry event as a structured `tracing` record.
///
/// Records use the `telemetry` target so they can be routed or filtered
/// separately (e.g. `RUST_LOG=info,telemetry=off`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TracingTelemetrySink {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn track(&self, event: &TelemetryEvent) {
        let properties = serde_json::to_string(event.properties()).unwrap_or_default();
        tracing::info!(
            target: "telemetry",
            name = event.name(),
            properties = %properties,
            "telemetry event"
        );
    }
}
