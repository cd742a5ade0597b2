//! Request dispatch: the entry point of the application layer.
//!
//! Callers open a [`RequestScope`] per logical operation and dispatch
//! commands and queries through it. Handlers and subscribers receive the same
//! scope, so nested dispatches share its change tracker, telemetry queue,
//! command counter and cancellation token.
//!
//! ## Command Pipeline
//!
//! ```text
//! Command
//!   ↓
//! 1. Validation        all validators run concurrently; any error short-circuits
//!   ↓
//! 2. Telemetry flush   the outermost dispatch flushes the queue
//!   ↓
//! 3. Unit of work      commits on success, rolls back otherwise
//!   ↓
//! 4. Domain events     publishes raised events (and their cascades) to subscribers
//!   ↓
//! Handler
//! ```
//!
//! Queries run stages 1 and 2 only.
//!
//! ## Error Semantics
//!
//! - **Business failures** travel as `Ok(Outcome::Failure)`: the unit of work
//!   rolls back, pending events are not published, telemetry is still flushed.
//! - **Fatal errors** travel as `Err(DispatchError)` and abort the whole
//!   operation: nothing is committed and the telemetry queue is discarded.

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use keystone_core::Outcome;
use keystone_events::{TelemetryEventsCollector, TelemetrySink};

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::counter::ConcurrentCommandCounter;
use crate::persistence::{ChangeTracker, Database, DomainEventCollector, PersistenceError, UnitOfWork};
use crate::registry::HandlerRegistry;
use crate::request::Request;

/// Fatal dispatch error: aborts the operation instead of producing an outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler registered for the request type (a wiring bug).
    #[error("no handler registered for {0}")]
    HandlerNotRegistered(&'static str),

    #[error("persistence failure: {0}")]
    Persistence(#[source] PersistenceError),

    /// A domain event subscriber failed.
    #[error("subscriber {subscriber} failed handling {event}: {source}")]
    Subscriber {
        subscriber: &'static str,
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Propagation published `limit` events and the collector still had more.
    #[error("domain event cascade exceeded {limit} events")]
    CascadeLimitExceeded { limit: usize },

    /// Too many dispatches in flight in one scope.
    #[error("nested dispatch depth exceeded {limit}")]
    NestingLimitExceeded { limit: usize },

    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected handler error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PersistenceError> for DispatchError {
    fn from(value: PersistenceError) -> Self {
        match value {
            PersistenceError::Cancelled => DispatchError::Cancelled,
            other => DispatchError::Persistence(other),
        }
    }
}

/// What every dispatch returns: an outcome, or a fatal error.
pub type DispatchResult<T> = Result<Outcome<T>, DispatchError>;

struct DispatcherInner {
    registry: HandlerRegistry,
    database: Arc<dyn Database>,
    sink: Arc<dyn TelemetrySink>,
    config: PipelineConfig,
}

/// Shared, cheaply clonable dispatch engine.
///
/// Holds the immutable registrations and the collaborators every scope needs;
/// all per-operation state lives in [`RequestScope`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        registry: HandlerRegistry,
        database: Arc<dyn Database>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::with_config(registry, database, sink, PipelineConfig::default())
    }

    pub fn with_config(
        registry: HandlerRegistry,
        database: Arc<dyn Database>,
        sink: Arc<dyn TelemetrySink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                database,
                sink,
                config,
            }),
        }
    }

    /// Open a scope for one logical operation.
    pub fn begin_scope(&self) -> RequestScope {
        self.begin_scope_with(CancellationToken::new())
    }

    /// Open a scope observing the caller's cancellation token.
    pub fn begin_scope_with(&self, cancellation: CancellationToken) -> RequestScope {
        RequestScope {
            dispatcher: self.clone(),
            change_tracker: Arc::new(ChangeTracker::new(Arc::clone(&self.inner.database))),
            telemetry: TelemetryEventsCollector::new(),
            counter: ConcurrentCommandCounter::new(),
            cancellation,
        }
    }

    /// Dispatch `request` in a fresh scope.
    pub async fn dispatch<R: Request>(&self, request: R) -> DispatchResult<R::Output> {
        let scope = self.begin_scope();
        scope.dispatch(request).await
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub fn sink(&self) -> &dyn TelemetrySink {
        self.inner.sink.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }
}

/// Per-operation state shared by a dispatch and everything nested in it.
#[derive(Debug)]
pub struct RequestScope {
    dispatcher: Dispatcher,
    change_tracker: Arc<ChangeTracker>,
    telemetry: TelemetryEventsCollector,
    counter: ConcurrentCommandCounter,
    cancellation: CancellationToken,
}

impl RequestScope {
    /// Run `request` through its registered pipeline.
    ///
    /// Handlers and subscribers call this to dispatch nested requests; they
    /// join the current operation rather than starting a new one. The dispatch
    /// is counted from just before its first stage until its pipeline returns.
    pub async fn dispatch<R: Request>(&self, request: R) -> DispatchResult<R::Output> {
        self.ensure_active()?;

        let limit = self.dispatcher.config().max_dispatch_depth;
        let depth = self.counter.current();
        if depth >= limit {
            return Err(DispatchError::NestingLimitExceeded { limit });
        }

        let pipeline = self
            .dispatcher
            .registry()
            .pipeline::<R>()
            .ok_or(DispatchError::HandlerNotRegistered(R::name()))?;

        let span = tracing::info_span!("dispatch", request = R::name(), depth);
        async {
            let result = {
                let _guard = self.counter.enter();
                pipeline.run(request, self).await
            };
            match &result {
                Ok(outcome) if outcome.is_success() => tracing::debug!("dispatch succeeded"),
                Ok(outcome) => tracing::debug!(
                    kind = ?outcome.status_category(),
                    message = outcome.error_message().unwrap_or_default(),
                    "dispatch returned a failure"
                ),
                Err(err) => tracing::warn!(error = %err, "dispatch aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// `Err(Cancelled)` once the scope's token has been cancelled.
    pub fn ensure_active(&self) -> Result<(), DispatchError> {
        if self.cancellation.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.change_tracker
    }

    pub fn telemetry(&self) -> &TelemetryEventsCollector {
        &self.telemetry
    }

    pub fn counter(&self) -> &ConcurrentCommandCounter {
        &self.counter
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &PipelineConfig {
        self.dispatcher.config()
    }

    pub fn unit_of_work(&self) -> &dyn UnitOfWork {
        self.change_tracker.as_ref()
    }

    pub fn domain_event_collector(&self) -> &dyn DomainEventCollector {
        self.change_tracker.as_ref()
    }
}
