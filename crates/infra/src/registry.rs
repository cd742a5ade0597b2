//! Handler, validator and subscriber registration.
//!
//! Registration happens once at startup through [`RegistryBuilder`]; the
//! resulting [`HandlerRegistry`] is immutable and shared by every dispatch.
//!
//! ## Lookup
//! - Pipelines and validators are keyed by the request's `TypeId`.
//! - Subscribers are keyed by the event's `TypeId` and kept in registration
//!   order, which is the order they run in.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use keystone_core::DomainEvent;
use keystone_events::DomainEventEnvelope;

use crate::command_dispatcher::RequestScope;
use crate::pipeline::Pipeline;
use crate::request::{Command, DomainEventHandler, Query, Request, RequestHandler, Validator};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("more than one handler registered for {0}")]
    DuplicateHandler(&'static str),
}

/// Type-erased subscriber, invoked with an event envelope.
#[async_trait]
pub(crate) trait ErasedSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        envelope: &DomainEventEnvelope,
        scope: &RequestScope,
    ) -> anyhow::Result<()>;
}

struct SubscriberAdapter<E, S> {
    inner: S,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, S> ErasedSubscriber for SubscriberAdapter<E, S>
where
    E: DomainEvent,
    S: DomainEventHandler<E>,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn handle(
        &self,
        envelope: &DomainEventEnvelope,
        scope: &RequestScope,
    ) -> anyhow::Result<()> {
        let event = envelope.downcast::<E>().ok_or_else(|| {
            anyhow::anyhow!(
                "subscriber {} cannot handle {}",
                self.inner.name(),
                envelope.event_type()
            )
        })?;
        self.inner.handle(event, scope).await
    }
}

type Validators<R> = Vec<Arc<dyn Validator<R>>>;

#[derive(Default)]
pub struct RegistryBuilder {
    pipelines: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    validators: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    subscribers: HashMap<TypeId, Vec<Arc<dyn ErasedSubscriber>>>,
    duplicates: Vec<&'static str>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler of command `R`, wrapped in the full command pipeline.
    pub fn command<R, H>(self, handler: H) -> Self
    where
        R: Command,
        H: RequestHandler<R>,
    {
        self.pipeline(Pipeline::for_command(Arc::new(handler)))
    }

    /// Register the handler of query `R`, wrapped in the query pipeline.
    pub fn query<R, H>(self, handler: H) -> Self
    where
        R: Query,
        H: RequestHandler<R>,
    {
        self.pipeline(Pipeline::for_query(Arc::new(handler)))
    }

    /// Register a custom pipeline for `R`.
    pub fn pipeline<R: Request>(mut self, pipeline: Pipeline<R>) -> Self {
        let key = TypeId::of::<R>();
        if self.pipelines.contains_key(&key) {
            self.duplicates.push(R::name());
        } else {
            self.pipelines.insert(key, Arc::new(pipeline));
        }
        self
    }

    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R>,
    {
        let slot = self
            .validators
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(Validators::<R>::new()) as Box<dyn Any + Send + Sync>);
        if let Some(validators) = slot.downcast_mut::<Validators<R>>() {
            validators.push(Arc::new(validator));
        }
        self
    }

    pub fn subscriber<E, S>(mut self, subscriber: S) -> Self
    where
        E: DomainEvent,
        S: DomainEventHandler<E>,
    {
        let adapter: Arc<dyn ErasedSubscriber> = Arc::new(SubscriberAdapter {
            inner: subscriber,
            _event: PhantomData::<fn() -> E>,
        });
        self.subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(adapter);
        self
    }

    /// Freeze the registrations.
    ///
    /// Fails if any request type got more than one handler.
    pub fn build(self) -> Result<HandlerRegistry, RegistryError> {
        if let Some(&name) = self.duplicates.first() {
            return Err(RegistryError::DuplicateHandler(name));
        }
        Ok(HandlerRegistry {
            pipelines: self.pipelines,
            validators: self.validators,
            subscribers: self.subscribers,
        })
    }
}

/// Immutable registrations consulted by every dispatch.
pub struct HandlerRegistry {
    pipelines: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    validators: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    subscribers: HashMap<TypeId, Vec<Arc<dyn ErasedSubscriber>>>,
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("requests", &self.pipelines.len())
            .field("validated_requests", &self.validators.len())
            .field("event_types", &self.subscribers.len())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn pipeline<R: Request>(&self) -> Option<&Pipeline<R>> {
        self.pipelines
            .get(&TypeId::of::<R>())?
            .downcast_ref::<Pipeline<R>>()
    }

    pub fn handles<R: Request>(&self) -> bool {
        self.pipeline::<R>().is_some()
    }

    /// Validators of `R`, in registration order.
    pub fn validators<R: Request>(&self) -> &[Arc<dyn Validator<R>>] {
        self.validators
            .get(&TypeId::of::<R>())
            .and_then(|slot| slot.downcast_ref::<Validators<R>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn subscribers(&self, event_type: TypeId) -> &[Arc<dyn ErasedSubscriber>] {
        self.subscribers
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names of the subscribers of `E`, in invocation order.
    pub fn subscriber_names<E: DomainEvent>(&self) -> Vec<&'static str> {
        self.subscribers(TypeId::of::<E>())
            .iter()
            .map(|s| s.name())
            .collect()
    }
}
