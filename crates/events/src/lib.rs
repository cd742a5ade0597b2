//! Domain event envelopes and request-scoped telemetry.

pub mod envelope;
pub mod in_memory_sink;
pub mod sink;
pub mod telemetry;

pub use envelope::DomainEventEnvelope;
pub use in_memory_sink::InMemoryTelemetrySink;
pub use sink::{NoopTelemetrySink, TelemetrySink};
pub use telemetry::{TelemetryEvent, TelemetryEventsCollector};
