use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use keystone_core::{AggregateKey, DomainEvent};

use crate::cancellation::CancellationToken;

/// Kind of a durable write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    /// The aggregate must not exist yet.
    Insert,
    /// The aggregate must already exist.
    Update,
}

/// One aggregate snapshot headed for the durable store.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateWrite {
    pub key: AggregateKey,
    pub kind: WriteKind,
    pub state: JsonValue,
}

/// Persistence operation error.
///
/// These are **infrastructure errors** (storage, serialization, cancellation)
/// as opposed to business failures, which handlers return as `Outcome::Failure`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("aggregate (de)serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("persistence operation cancelled")]
    Cancelled,
}

/// Durable aggregate store behind the change tracker.
///
/// Implementations must:
/// - apply a `save` batch atomically (all writes or none)
/// - reject an `Insert` of an existing key and an `Update` of a missing key
/// - return aggregates of one type from `load_all` in a stable order
#[async_trait]
pub trait Database: Send + Sync {
    async fn load(&self, key: &AggregateKey) -> Result<Option<JsonValue>, PersistenceError>;

    async fn load_all(&self, aggregate_type: &str) -> Result<Vec<JsonValue>, PersistenceError>;

    async fn save(&self, writes: Vec<AggregateWrite>) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<S> Database for Arc<S>
where
    S: Database + ?Sized,
{
    async fn load(&self, key: &AggregateKey) -> Result<Option<JsonValue>, PersistenceError> {
        (**self).load(key).await
    }

    async fn load_all(&self, aggregate_type: &str) -> Result<Vec<JsonValue>, PersistenceError> {
        (**self).load_all(aggregate_type).await
    }

    async fn save(&self, writes: Vec<AggregateWrite>) -> Result<(), PersistenceError> {
        (**self).save(writes).await
    }
}

/// Position in a scope's change history, taken when a unit of work opens.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Savepoint {
    pub journal_len: usize,
    pub staged_len: usize,
    /// Units of work already open when this one began.
    pub depth: usize,
}

impl Savepoint {
    pub fn is_outermost(&self) -> bool {
        self.depth == 0
    }
}

/// What a successful commit did.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CommitSummary {
    /// Aggregates saved into the scope transaction by this commit.
    pub saved: usize,
    /// Aggregates written to the durable store (outermost commits only).
    pub persisted: usize,
    pub durable: bool,
}

/// Commit boundary of one dispatch.
///
/// `begin` opens a unit of work and returns its savepoint; exactly one of
/// `commit` or `rollback` closes it. Only the outermost unit of work of a
/// scope reaches durable storage; nested ones save into the scope transaction.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn begin(&self) -> Savepoint;

    /// Save every pending mutation.
    ///
    /// Panics if a tracked aggregate still holds domain events: the
    /// propagation stage must have drained them first.
    async fn commit(
        &self,
        savepoint: Savepoint,
        cancellation: &CancellationToken,
    ) -> Result<CommitSummary, PersistenceError>;

    /// Discard every mutation made since `savepoint`.
    fn rollback(&self, savepoint: Savepoint);
}

/// An aggregate holding unpublished domain events.
#[derive(Debug, Clone)]
pub struct PendingAggregate {
    pub key: AggregateKey,
    /// Pending events in raise order.
    pub events: Vec<Arc<dyn DomainEvent>>,
}

/// Read-only query over change-tracking state, plus the clearing hook the
/// propagation stage uses once it has taken ownership of the events.
pub trait DomainEventCollector: Send + Sync {
    fn aggregates_with_pending_events(&self) -> Vec<PendingAggregate>;

    fn clear_domain_events(&self, key: &AggregateKey);
}
