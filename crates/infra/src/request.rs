//! Request, handler, validator and subscriber contracts.

use async_trait::async_trait;

use keystone_core::{DomainEvent, FieldError};

use crate::command_dispatcher::{DispatchResult, RequestScope};

/// Anything that can be dispatched: a command or a query.
///
/// Requests are passed by value down the pipeline; validators only borrow them.
pub trait Request: Send + Sync + 'static {
    /// Value carried by `Outcome::Success`.
    type Output: Send + 'static;

    /// Short name used in logs, spans and error messages.
    fn name() -> &'static str {
        short_type_name::<Self>()
    }
}

/// A request that changes state. Runs inside a unit of work.
pub trait Command: Request {}

/// A read-only request. Never opens a unit of work.
pub trait Query: Request {}

/// Terminal handler of one request type.
///
/// Business failures are returned as `Outcome::Failure`; `Err` is reserved for
/// fatal errors that abort the whole operation.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: R, scope: &RequestScope) -> DispatchResult<R::Output>;
}

/// Validates a request before its handler runs.
///
/// Validators never fail fatally: every problem is a field error. All
/// validators of a request run concurrently and their errors are merged.
#[async_trait]
pub trait Validator<R: Request>: Send + Sync + 'static {
    async fn validate(&self, request: &R) -> Vec<FieldError>;
}

/// Reacts to a domain event inside the scope that raised it.
///
/// A subscriber may mutate aggregates through the scope's change tracker or
/// dispatch further commands; any error aborts the originating dispatch.
#[async_trait]
pub trait DomainEventHandler<E: DomainEvent>: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    async fn handle(&self, event: &E, scope: &RequestScope) -> anyhow::Result<()>;
}

/// `std::any::type_name` without the module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
