//! Aggregate persistence boundary.
//!
//! Handlers never write to storage directly. They stage mutations in the
//! scope's [`ChangeTracker`]; the unit-of-work stage commits them, and only the
//! outermost commit of a scope reaches the [`Database`].

pub mod change_tracker;
pub mod in_memory;
pub mod r#trait;

pub use change_tracker::ChangeTracker;
pub use in_memory::InMemoryDatabase;
pub use r#trait::{
    AggregateWrite, CommitSummary, Database, DomainEventCollector, PendingAggregate,
    PersistenceError, Savepoint, UnitOfWork, WriteKind,
};
