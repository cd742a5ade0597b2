//! Domain events raised by aggregates during a unit of work.

use core::any::{Any, TypeId};

use chrono::{DateTime, Utc};

/// Upcast helper so type-erased events can be downcast by subscribers.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An immutable fact scoped to one aggregate.
///
/// Events are raised by aggregate business methods and stay on the aggregate
/// until the propagation stage of the dispatch pipeline drains them.
pub trait DomainEvent: AsAny + core::fmt::Debug + Send + Sync {
    /// Stable event name (e.g. "TenantCreated").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Concrete type of a type-erased event; subscribers are keyed by it.
pub fn event_type_id(event: &dyn DomainEvent) -> TypeId {
    event.as_any().type_id()
}

/// Downcast a type-erased event to its concrete type.
pub fn downcast_event<E: DomainEvent>(event: &dyn DomainEvent) -> Option<&E> {
    event.as_any().downcast_ref::<E>()
}
