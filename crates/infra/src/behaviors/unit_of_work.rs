use async_trait::async_trait;

use crate::command_dispatcher::{DispatchResult, RequestScope};
use crate::pipeline::{Middleware, Next};
use crate::request::Command;

/// Wraps a command in a unit of work.
///
/// - success: commit (durable only for the outermost command of the scope)
/// - failure outcome: roll back everything done since the unit began
/// - fatal error, including a failed commit: roll back and propagate
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitOfWorkBehavior;

#[async_trait]
impl<R: Command> Middleware<R> for UnitOfWorkBehavior {
    fn name(&self) -> &'static str {
        "unit_of_work"
    }

    async fn handle(
        &self,
        request: R,
        scope: &RequestScope,
        next: Next<'_, R>,
    ) -> DispatchResult<R::Output> {
        let unit_of_work = scope.unit_of_work();
        let savepoint = unit_of_work.begin();

        let outcome = match next.run(request, scope).await {
            Ok(outcome) => outcome,
            Err(err) => {
                unit_of_work.rollback(savepoint);
                return Err(err);
            }
        };

        if !outcome.is_success() {
            unit_of_work.rollback(savepoint);
            tracing::debug!("failure outcome; unit of work rolled back");
            return Ok(outcome);
        }

        match unit_of_work.commit(savepoint, scope.cancellation()).await {
            Ok(summary) => {
                tracing::debug!(
                    saved = summary.saved,
                    persisted = summary.persisted,
                    durable = summary.durable,
                    "unit of work committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                unit_of_work.rollback(savepoint);
                Err(err.into())
            }
        }
    }
}
