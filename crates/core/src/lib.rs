//! `keystone-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the business failure taxonomy, the `Outcome` value handlers
//! return, and aggregates that carry pending domain events.

pub mod aggregate;
pub mod domain_event;
pub mod error;
pub mod id;
pub mod outcome;

pub use aggregate::{AggregateKey, AggregateRoot, AuditInfo, DomainEvents, key_of};
pub use domain_event::{AsAny, DomainEvent, downcast_event, event_type_id};
pub use error::{ErrorKind, Failure, FieldError};
pub use id::{AggregateId, InvalidId, TenantId, UserId};
pub use outcome::Outcome;
