use async_trait::async_trait;
use futures::future::join_all;

use keystone_core::{Failure, FieldError, Outcome};

use crate::command_dispatcher::{DispatchResult, RequestScope};
use crate::pipeline::{Middleware, Next};
use crate::request::Request;

/// Runs every validator registered for the request before anything else.
///
/// Validators run concurrently. If any of them reports a field error the
/// request is answered with a bad-request failure carrying all errors, and
/// the rest of the pipeline never runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationBehavior;

#[async_trait]
impl<R: Request> Middleware<R> for ValidationBehavior {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(
        &self,
        request: R,
        scope: &RequestScope,
        next: Next<'_, R>,
    ) -> DispatchResult<R::Output> {
        let validators = scope.dispatcher().registry().validators::<R>();
        if !validators.is_empty() {
            let reports = join_all(validators.iter().map(|v| v.validate(&request))).await;
            let errors: Vec<FieldError> = reports.into_iter().flatten().collect();
            if !errors.is_empty() {
                tracing::debug!(
                    request = R::name(),
                    errors = errors.len(),
                    "request rejected by validation"
                );
                return Ok(Outcome::failure(Failure::bad_request_with(errors)));
            }
        }

        next.run(request, scope).await
    }
}
