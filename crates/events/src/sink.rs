//! Observability sink abstraction (mechanics only).
//!
//! The sink is the destination of flushed telemetry. From the pipeline's point
//! of view tracking is fire-and-forget: `track` cannot fail and is never
//! awaited, so a slow or broken exporter never aborts a unit of work.
//!
//! ```text
//! business logic → TelemetryEventsCollector (per scope)
//!                        ↓ outermost dispatch completes
//!                  TelemetrySink::track (one call per event, FIFO)
//! ```

use std::sync::Arc;

use crate::telemetry::TelemetryEvent;

/// Destination of flushed telemetry events.
///
/// Implementations must be safe to share across request scopes.
pub trait TelemetrySink: Send + Sync {
    fn track(&self, event: &TelemetryEvent);
}

impl<S> TelemetrySink for Arc<S>
where
    S: TelemetrySink + ?Sized,
{
    fn track(&self, event: &TelemetryEvent) {
        (**self).track(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn track(&self, _event: &TelemetryEvent) {}
}
