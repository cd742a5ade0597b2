//! Telemetry events and the per-scope telemetry queue.
//!
//! Business logic collects telemetry while it runs; the dispatch pipeline
//! forwards the whole batch to the observability sink once the outermost
//! dispatch of a request scope completes. Nested dispatches only ever add to
//! the queue.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// A named telemetry event with a flat string property bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    name: String,
    properties: BTreeMap<String, String>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// FIFO queue of telemetry events for one request scope.
///
/// Cloning yields another handle onto the same queue. Every dispatch within a
/// scope shares it; only the telemetry-flush stage dequeues.
#[derive(Debug, Clone, Default)]
pub struct TelemetryEventsCollector {
    queue: Arc<Mutex<VecDeque<TelemetryEvent>>>,
}

impl TelemetryEventsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect_event(&self, event: TelemetryEvent) {
        self.lock().push_back(event);
    }

    pub fn has_events(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_events()
    }

    pub fn dequeue(&self) -> Option<TelemetryEvent> {
        self.lock().pop_front()
    }

    /// Drop everything queued so far, returning how many events were lost.
    pub fn discard_all(&self) -> usize {
        let mut queue = self.lock();
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TelemetryEvent>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
