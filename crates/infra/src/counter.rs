//! Nesting-aware concurrent-command counter.
//!
//! Every dispatch in a request scope holds a [`CommandGuard`] while it runs.
//! The count therefore equals the number of in-flight dispatches, and reaches
//! zero only when the outermost one finishes. Telemetry is flushed by that
//! outermost dispatch, while it is the only one still counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default)]
pub struct ConcurrentCommandCounter {
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrentCommandCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more in-flight dispatch until the guard is dropped.
    pub fn enter(&self) -> CommandGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        CommandGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn current(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_zero(&self) -> bool {
        self.current() == 0
    }

    /// True while at most one dispatch is in flight.
    pub fn is_outermost(&self) -> bool {
        self.current() <= 1
    }
}

/// Decrements the counter on drop, including on error, panic and cancellation.
#[must_use = "the dispatch stops being counted as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CommandGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for CommandGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
