//! Infrastructure layer: request dispatch, pipeline stages, persistence.
//!
//! ## Modules
//! - `request` / `registry`: contracts and the static handler registry
//! - `pipeline` / `behaviors`: the middleware chain and its built-in stages
//! - `command_dispatcher`: `Dispatcher`, `RequestScope` and `DispatchError`
//! - `persistence`: change tracking, unit of work, durable store boundary
//! - `counter` / `cancellation` / `config`: per-scope plumbing and limits

pub mod behaviors;
pub mod cancellation;
pub mod command_dispatcher;
pub mod config;
pub mod counter;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod request;

#[cfg(test)]
mod test_support;

pub use cancellation::CancellationToken;
pub use command_dispatcher::{DispatchError, DispatchResult, Dispatcher, RequestScope};
pub use config::PipelineConfig;
pub use counter::{CommandGuard, ConcurrentCommandCounter};
pub use persistence::{ChangeTracker, Database, InMemoryDatabase, PersistenceError};
pub use pipeline::{Middleware, Next, Pipeline};
pub use registry::{HandlerRegistry, RegistryBuilder, RegistryError};
pub use request::{Command, DomainEventHandler, Query, Request, RequestHandler, Validator};
