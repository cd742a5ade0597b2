use async_trait::async_trait;

use crate::command_dispatcher::{DispatchResult, RequestScope};
use crate::pipeline::{Middleware, Next};
use crate::request::Request;

/// Defers telemetry to the end of the outermost dispatch.
///
/// Only the outermost dispatch of a scope flushes: when its pipeline returns
/// and it is the last one still counted, the whole operation is over and the
/// scope's queue goes to the sink in FIFO order, exactly once. A fatal error discards the
/// queue instead: telemetry of an aborted operation is never reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryFlushBehavior;

#[async_trait]
impl<R: Request> Middleware<R> for TelemetryFlushBehavior {
    fn name(&self) -> &'static str {
        "telemetry_flush"
    }

    async fn handle(
        &self,
        request: R,
        scope: &RequestScope,
        next: Next<'_, R>,
    ) -> DispatchResult<R::Output> {
        let result = next.run(request, scope).await;

        if !scope.counter().is_outermost() {
            return result;
        }

        match &result {
            Ok(_) => flush(scope),
            Err(err) => {
                let discarded = scope.telemetry().discard_all();
                if discarded > 0 {
                    tracing::warn!(discarded, error = %err, "discarded telemetry of aborted operation");
                }
            }
        }
        result
    }
}

fn flush(scope: &RequestScope) {
    let sink = scope.dispatcher().sink();
    let mut flushed = 0usize;
    while let Some(event) = scope.telemetry().dequeue() {
        sink.track(&event);
        flushed += 1;
    }
    if flushed > 0 {
        tracing::debug!(flushed, "telemetry flushed");
    }
}
