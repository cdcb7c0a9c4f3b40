use crate::error::ClientError;
use crate::registry::Endpoint;
use conduit_proto::ResultEnvelope;
use conduit_signals::Observer;
use std::sync::Arc;

/// Externally injected op-application (§4.5: "op application is externally
/// injected; the reducer only sequences and distributes"). Kept synchronous
/// to match [`Endpoint::apply_ops`] and the `Observer::next` call site,
/// which is itself synchronous; an applier with real async work should
/// spawn it and apply the result through a fresh `snapshot`-shaped message
/// instead of blocking here.
pub trait OpApplier: Send + Sync {
    fn apply(&self, baseline: &serde_json::Value, ops: &[serde_json::Value]) -> serde_json::Value;
}

/// Bridges a transport's subscription stream to an [`Endpoint`]. One
/// instance is handed to `SubscriptionStream::subscribe` per subscription
/// attempt; it sequences `snapshot`/`ops`/`error` and relays `complete`
/// (§4.5/C5). Re-subscription on selection expansion means a fresh
/// `Reducer` is created and handed to the new subscribe call — this type
/// carries no cross-subscription state of its own.
pub struct Reducer<A: OpApplier> {
    endpoint: Endpoint,
    applier: Arc<A>,
}

impl<A: OpApplier> Reducer<A> {
    pub fn new(endpoint: Endpoint, applier: Arc<A>) -> Self { Self { endpoint, applier } }
}

impl<A: OpApplier + 'static> Observer<ResultEnvelope, ClientError> for Reducer<A> {
    fn next(&self, value: ResultEnvelope) {
        match value {
            ResultEnvelope::Snapshot { data } => self.endpoint.distribute_data(data),
            ResultEnvelope::Ops { ops } => {
                let applier = Arc::clone(&self.applier);
                self.endpoint.apply_ops(&ops, &|baseline, ops| applier.apply(baseline, ops));
            }
            ResultEnvelope::Error { error } => self.endpoint.distribute_error(ClientError::Operation(error)),
        }
    }

    fn error(&self, err: ClientError) { self.endpoint.distribute_error(err); }

    fn complete(&self) { self.endpoint.distribute_complete(); }
}
