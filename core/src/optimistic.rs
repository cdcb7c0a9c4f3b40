use crate::error::ClientError;
use crate::registry::Registry;
use async_trait::async_trait;
use conduit_proto::{EndpointKey, OptimisticDescriptor, TransactionId};

/// Handed to an [`OptimisticInterpreter`] so it can push a refiltered
/// baseline to every observer of an affected endpoint after it applies or
/// reverts a predicted effect. The core has no notion of which endpoints an
/// entity touches — that mapping lives entirely in the interpreter's own
/// model — so it only hands over the means to redeliver, never computes the
/// affected set itself (§4.10: "notifies affected endpoint subscriptions so
/// they refilter and deliver").
#[derive(Clone)]
pub struct EndpointNotifier(Registry);

impl EndpointNotifier {
    pub(crate) fn new(registry: Registry) -> Self { Self(registry) }

    /// Re-broadcasts `data` as the new baseline for `key`'s endpoint. A
    /// no-op if nothing is currently subscribed to that endpoint — there is
    /// no one to refilter for.
    pub fn notify(&self, key: &EndpointKey, data: serde_json::Value) {
        if let Some(endpoint) = self.0.get(key) {
            endpoint.distribute_data(data);
        }
    }
}

/// External policy plugged in by the caller; the core only orders the three
/// calls and routes the refilter notification, never interprets `dsl`
/// itself (§4.10/C10, §6).
#[async_trait]
pub trait OptimisticInterpreter: Send + Sync {
    /// Apply the predicted effect for `descriptor` against `input`, return a
    /// transaction id the core will later confirm or roll back. Implementors
    /// that mutate a locally cached entity call `notifier.notify` for every
    /// endpoint whose data includes that entity.
    async fn apply(&self, descriptor: &OptimisticDescriptor, input: Option<&serde_json::Value>, notifier: &EndpointNotifier) -> Result<TransactionId, ClientError>;

    /// The mutation completed successfully with `server_data`; forget the
    /// rollback and reconcile any divergence between predicted and actual.
    async fn confirm(&self, tx_id: TransactionId, server_data: &serde_json::Value, notifier: &EndpointNotifier) -> Result<(), ClientError>;

    /// The mutation failed (network or operation error); revert the
    /// predicted effect and notify affected endpoints of the restored value.
    async fn rollback(&self, tx_id: TransactionId, notifier: &EndpointNotifier) -> Result<(), ClientError>;
}

/// Hands the caller a way to cancel an in-flight optimistic mutation by
/// forcing the same rollback the core would run on failure. Calling it
/// after the transaction already confirmed or rolled back is a no-op.
pub struct OptimisticHandle {
    tx_id: TransactionId,
    interpreter: std::sync::Arc<dyn OptimisticInterpreter>,
    notifier: EndpointNotifier,
    settled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl OptimisticHandle {
    pub fn tx_id(&self) -> TransactionId { self.tx_id }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        if self.settled.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        self.interpreter.rollback(self.tx_id, &self.notifier).await
    }
}

/// Brackets a mutation's network call with apply/confirm/rollback against
/// an [`OptimisticInterpreter`]. `begin`/`settle` drive the mutation's
/// apply and resolution; the returned [`OptimisticHandle`] lets a caller
/// pre-empt that with a manual cancel.
pub struct OptimisticBracket {
    interpreter: std::sync::Arc<dyn OptimisticInterpreter>,
    registry: Registry,
}

impl OptimisticBracket {
    pub fn new(interpreter: std::sync::Arc<dyn OptimisticInterpreter>, registry: Registry) -> Self { Self { interpreter, registry } }

    pub async fn begin(&self, descriptor: &OptimisticDescriptor, input: Option<&serde_json::Value>) -> Result<OptimisticHandle, ClientError> {
        let notifier = EndpointNotifier::new(self.registry.clone());
        let tx_id = self.interpreter.apply(descriptor, input, &notifier).await?;
        Ok(OptimisticHandle {
            tx_id,
            interpreter: std::sync::Arc::clone(&self.interpreter),
            notifier,
            settled: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Settle a handle against the outcome of the bracketed mutation:
    /// confirm on success, roll back on any error. A handle already
    /// cancelled via [`OptimisticHandle::cancel`] is left alone.
    pub async fn settle(&self, handle: &OptimisticHandle, outcome: Result<&serde_json::Value, &ClientError>) -> Result<(), ClientError> {
        if handle.settled.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        match outcome {
            Ok(server_data) => self.interpreter.confirm(handle.tx_id, server_data, &handle.notifier).await,
            Err(_) => self.interpreter.rollback(handle.tx_id, &handle.notifier).await,
        }
    }
}
