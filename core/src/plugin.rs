use crate::error::ClientError;
use async_trait::async_trait;
use conduit_proto::{OperationEnvelope, ResultEnvelope};
use futures::future::BoxFuture;

/// Re-issue the failing operation through the rest of the dispatch pipeline.
/// Handed to `Plugin::on_error` so a retry plugin doesn't need to reach back
/// into the dispatch engine itself.
pub type RetryFn<'a> = &'a (dyn Fn(OperationEnvelope) -> BoxFuture<'a, Result<ResultEnvelope, ClientError>> + Send + Sync);

/// A unit in the dispatch pipeline (§4.4, §6). Hooks run in registration
/// order on the way out (`before_request`) and in registration order on the
/// way back (`after_response`, `on_error`) — the core does not reverse the
/// list for the response leg. All hooks default to a no-op pass-through so
/// a plugin implements only the seam it cares about.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn before_request(&self, op: OperationEnvelope) -> Result<OperationEnvelope, ClientError> { Ok(op) }

    async fn after_response(&self, result: ResultEnvelope, _op: &OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        Ok(result)
    }

    /// Called only when the pipeline produced an error. Returning `Ok` stops
    /// the chain at this plugin; returning `Err` passes the (possibly new)
    /// error to the next plugin in line. The default is "no recovery".
    async fn on_error<'a>(
        &'a self,
        err: ClientError,
        _op: &'a OperationEnvelope,
        _retry: RetryFn<'a>,
    ) -> Result<ResultEnvelope, ClientError> {
        Err(err)
    }
}
