//! Ordered middleware chain around a terminal handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::behaviors::{
    DomainEventsBehavior, TelemetryFlushBehavior, UnitOfWorkBehavior, ValidationBehavior,
};
use crate::command_dispatcher::{DispatchError, DispatchResult, RequestScope};
use crate::request::{Command, Query, Request, RequestHandler};

/// One pipeline stage.
///
/// A stage either short-circuits with its own result or calls `next.run` to
/// invoke the rest of the chain, then post-processes what comes back.
#[async_trait]
pub trait Middleware<R: Request>: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        request: R,
        scope: &RequestScope,
        next: Next<'_, R>,
    ) -> DispatchResult<R::Output>;
}

/// The remainder of a pipeline, handed to each stage.
pub struct Next<'a, R: Request> {
    stages: &'a [Arc<dyn Middleware<R>>],
    handler: &'a dyn RequestHandler<R>,
}

impl<R: Request> Next<'_, R> {
    pub async fn run(self, request: R, scope: &RequestScope) -> DispatchResult<R::Output> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.handle(request, scope, next).await
            }
            None => run_handler(self.handler, request, scope).await,
        }
    }
}

/// Run the terminal handler, abandoning it as soon as the scope is cancelled.
async fn run_handler<R: Request>(
    handler: &dyn RequestHandler<R>,
    request: R,
    scope: &RequestScope,
) -> DispatchResult<R::Output> {
    let cancellation = scope.cancellation();
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(DispatchError::Cancelled),
        result = handler.handle(request, scope) => result,
    }
}

/// Stages plus terminal handler of one request type.
pub struct Pipeline<R: Request> {
    stages: Vec<Arc<dyn Middleware<R>>>,
    handler: Arc<dyn RequestHandler<R>>,
}

impl<R: Request> Pipeline<R> {
    pub fn new(stages: Vec<Arc<dyn Middleware<R>>>, handler: Arc<dyn RequestHandler<R>>) -> Self {
        Self { stages, handler }
    }

    /// Validation → telemetry flush → unit of work → domain events → handler.
    pub fn for_command(handler: Arc<dyn RequestHandler<R>>) -> Self
    where
        R: Command,
    {
        let stages: Vec<Arc<dyn Middleware<R>>> = vec![
            Arc::new(ValidationBehavior),
            Arc::new(TelemetryFlushBehavior),
            Arc::new(UnitOfWorkBehavior),
            Arc::new(DomainEventsBehavior),
        ];
        Self::new(stages, handler)
    }

    /// Validation → telemetry flush → handler.
    pub fn for_query(handler: Arc<dyn RequestHandler<R>>) -> Self
    where
        R: Query,
    {
        let stages: Vec<Arc<dyn Middleware<R>>> =
            vec![Arc::new(ValidationBehavior), Arc::new(TelemetryFlushBehavior)];
        Self::new(stages, handler)
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, request: R, scope: &RequestScope) -> DispatchResult<R::Output> {
        let next = Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        };
        next.run(request, scope).await
    }
}
