//! In-memory telemetry sink for tests/dev.

use std::sync::{Mutex, PoisonError};

use crate::sink::TelemetrySink;
use crate::telemetry::TelemetryEvent;

/// Records every tracked event, in order.
///
/// - No IO
/// - Cheap to inspect from tests after a dispatch returns
#[derive(Debug, Default)]
pub struct InMemoryTelemetrySink {
    tracked: Mutex<Vec<TelemetryEvent>>,
}

impl InMemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything tracked so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn track(&self, event: &TelemetryEvent) {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
