use crate::error::ClientError;
use crate::transport::{Capabilities, SubscriptionStream, Transport};
use conduit_proto::{OperationEnvelope, ResultEnvelope};
use std::sync::Arc;

/// Selects a transport method for an operation by declared capability
/// rather than by trying a call and catching "not implemented" (§4.8/C11).
/// A subscription may fall back to a query-capable-only transport when the
/// operation doesn't actually require streaming — the call runs once and
/// the caller sees a single `snapshot` followed by `complete`.
pub struct CapabilityRouter {
    transport: Arc<dyn Transport>,
}

impl CapabilityRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self { Self { transport } }

    pub fn capabilities(&self) -> Capabilities { self.transport.capabilities() }

    pub async fn route_query(&self, op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        if !self.transport.capabilities().query {
            return Err(ClientError::configuration("transport does not declare query capability"));
        }
        self.transport.query(op).await
    }

    pub async fn route_mutation(&self, op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        if !self.transport.capabilities().mutation {
            return Err(ClientError::configuration("transport does not declare mutation capability"));
        }
        let result = self.transport.mutation(op).await?;
        if matches!(result, ResultEnvelope::Ops { .. }) {
            return Err(ClientError::protocol("mutation result arrived as `ops`, which only a subscription may send"));
        }
        Ok(result)
    }

    /// Routes a subscription. When the transport can't stream but the
    /// operation doesn't need to (`requires_stream == false`), falls back to
    /// a one-shot query dressed up as a subscription that immediately
    /// completes (§4.8's documented fallback).
    pub async fn route_subscription(&self, op: OperationEnvelope, requires_stream: bool) -> Result<Box<dyn SubscriptionStream>, ClientError> {
        let caps = self.transport.capabilities();
        if caps.subscription {
            return self.transport.subscription(op).await;
        }
        if requires_stream || !caps.query {
            return Err(ClientError::configuration("transport declares neither subscription nor a query fallback for this operation"));
        }
        let result = self.transport.query(op).await;
        Ok(Box::new(OneShotSubscription { result }))
    }
}

/// Wraps a single query result as a subscription that delivers it once and
/// completes — the capability-fallback path's adapter.
struct OneShotSubscription {
    result: Result<ResultEnvelope, ClientError>,
}

impl SubscriptionStream for OneShotSubscription {
    fn subscribe(&self, observer: crate::transport::SubscriptionObserver) -> conduit_signals::Unsubscribe {
        match &self.result {
            Ok(envelope) => observer.next(envelope.clone()),
            Err(err) => observer.error(err.clone()),
        }
        observer.complete();
        conduit_signals::Unsubscribe::new(|| {})
    }
}
