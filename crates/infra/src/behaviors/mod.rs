//! The built-in pipeline stages.

pub mod domain_events;
pub mod telemetry;
pub mod unit_of_work;
pub mod validation;

pub use domain_events::{DomainEventsBehavior, publish_domain_events};
pub use telemetry::TelemetryFlushBehavior;
pub use unit_of_work::UnitOfWorkBehavior;
pub use validation::ValidationBehavior;
