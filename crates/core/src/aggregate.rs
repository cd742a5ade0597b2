//! Aggregate roots: identity, audit timestamps and pending domain events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain_event::DomainEvent;

/// Type-erased identity of an aggregate (`aggregate_type` + rendered id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    pub aggregate_type: String,
    pub id: String,
}

impl AggregateKey {
    pub fn new(aggregate_type: impl Into<String>, id: impl ToString) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.to_string(),
        }
    }
}

impl core::fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.id)
    }
}

/// Created/modified timestamps of an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl AuditInfo {
    pub fn created(at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            modified_at: None,
        }
    }

    pub fn mark_modified(&mut self, at: DateTime<Utc>) {
        self.modified_at = Some(at);
    }
}

/// Ordered, append-only list of events raised during the current unit of work.
///
/// Business methods only ever `raise`. Clearing belongs to the dispatch
/// pipeline, which drains the list before the unit of work commits.
#[derive(Debug, Clone, Default)]
pub struct DomainEvents {
    events: Vec<Arc<dyn DomainEvent>>,
}

impl DomainEvents {
    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.events.push(Arc::new(event));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DomainEvent> {
        self.events.iter().map(|e| e.as_ref())
    }

    /// Shared handles onto the pending events, in raise order.
    pub fn snapshot(&self) -> Vec<Arc<dyn DomainEvent>> {
        self.events.clone()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Aggregate root: the unit of consistency and persistence.
///
/// Implementations keep their `DomainEvents` out of the persisted state
/// (`#[serde(skip)]`); events only live for the current unit of work.
pub trait AggregateRoot: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync;

    /// Stable type name used in storage keys (e.g. "tenant").
    const AGGREGATE_TYPE: &'static str;

    fn id(&self) -> &Self::Id;

    fn audit(&self) -> &AuditInfo;

    fn audit_mut(&mut self) -> &mut AuditInfo;

    fn domain_events(&self) -> &DomainEvents;

    fn domain_events_mut(&mut self) -> &mut DomainEvents;

    fn key(&self) -> AggregateKey {
        key_of::<Self>(self.id())
    }
}

/// Storage key of the aggregate `A` with the given id.
pub fn key_of<A: AggregateRoot>(id: &A::Id) -> AggregateKey {
    AggregateKey::new(A::AGGREGATE_TYPE, id)
}
