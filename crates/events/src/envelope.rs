use core::any::TypeId;
use std::sync::Arc;

use uuid::Uuid;

use keystone_core::{AggregateKey, DomainEvent, downcast_event, event_type_id};

/// A drained domain event on its way to subscribers.
///
/// Ownership of the event moves from the aggregate to the envelope when the
/// propagation stage drains it; subscribers only ever see it through here.
#[derive(Debug, Clone)]
pub struct DomainEventEnvelope {
    event_id: Uuid,
    aggregate: AggregateKey,
    event: Arc<dyn DomainEvent>,
}

impl DomainEventEnvelope {
    pub fn new(aggregate: AggregateKey, event: Arc<dyn DomainEvent>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate,
            event,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// The aggregate that raised the event.
    pub fn aggregate(&self) -> &AggregateKey {
        &self.aggregate
    }

    pub fn event(&self) -> &dyn DomainEvent {
        self.event.as_ref()
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Concrete event type, used to look up subscribers.
    pub fn event_type_id(&self) -> TypeId {
        event_type_id(self.event())
    }

    pub fn downcast<E: DomainEvent>(&self) -> Option<&E> {
        downcast_event::<E>(self.event())
    }
}
