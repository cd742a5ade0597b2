use std::collections::VecDeque;

use async_trait::async_trait;

use keystone_events::DomainEventEnvelope;

use crate::command_dispatcher::{DispatchError, DispatchResult, RequestScope};
use crate::persistence::DomainEventCollector;
use crate::pipeline::{Middleware, Next};
use crate::request::Command;

/// Publishes the domain events a successful command raised.
///
/// Runs inside the unit of work, so subscriber side effects commit or roll
/// back together with the command.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomainEventsBehavior;

#[async_trait]
impl<R: Command> Middleware<R> for DomainEventsBehavior {
    fn name(&self) -> &'static str {
        "domain_events"
    }

    async fn handle(
        &self,
        request: R,
        scope: &RequestScope,
        next: Next<'_, R>,
    ) -> DispatchResult<R::Output> {
        let outcome = next.run(request, scope).await?;
        if outcome.is_success() {
            publish_domain_events(scope).await?;
        }
        Ok(outcome)
    }
}

/// Drain the scope's pending domain events and hand each to its subscribers.
///
/// Events raised while publishing are picked up by the same pass, so the loop
/// ends only once the collector reports nothing pending. Returns how many
/// events were published.
pub async fn publish_domain_events(scope: &RequestScope) -> Result<usize, DispatchError> {
    let collector = scope.domain_event_collector();
    let limit = scope.config().max_cascade_events;

    let mut queue = VecDeque::new();
    take_pending(collector, &mut queue);

    let mut published = 0usize;
    while let Some(envelope) = queue.pop_front() {
        if published == limit {
            return Err(DispatchError::CascadeLimitExceeded { limit });
        }
        scope.ensure_active()?;

        publish(&envelope, scope).await?;
        published += 1;

        take_pending(collector, &mut queue);
    }

    if published > 0 {
        tracing::debug!(published, "domain events propagated");
    }
    Ok(published)
}

/// Move every pending event into `queue`, clearing it from its aggregate.
fn take_pending(collector: &dyn DomainEventCollector, queue: &mut VecDeque<DomainEventEnvelope>) {
    for pending in collector.aggregates_with_pending_events() {
        queue.extend(
            pending
                .events
                .into_iter()
                .map(|event| DomainEventEnvelope::new(pending.key.clone(), event)),
        );
        collector.clear_domain_events(&pending.key);
    }
}

async fn publish(envelope: &DomainEventEnvelope, scope: &RequestScope) -> Result<(), DispatchError> {
    let subscribers = scope
        .dispatcher()
        .registry()
        .subscribers(envelope.event_type_id());

    tracing::trace!(
        event = envelope.event_type(),
        aggregate = %envelope.aggregate(),
        subscribers = subscribers.len(),
        "publishing domain event"
    );

    let cancellation = scope.cancellation();
    for subscriber in subscribers {
        scope.ensure_active()?;
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(DispatchError::Cancelled),
            result = subscriber.handle(envelope, scope) => result.map_err(|source| {
                subscriber_error(subscriber.name(), envelope.event_type(), source)
            })?,
        }
    }
    Ok(())
}

/// Fatal errors from nested dispatches pass through unchanged.
fn subscriber_error(
    subscriber: &'static str,
    event: &'static str,
    source: anyhow::Error,
) -> DispatchError {
    match source.downcast::<DispatchError>() {
        Ok(inner) => inner,
        Err(source) => DispatchError::Subscriber {
            subscriber,
            event,
            source,
        },
    }
}
