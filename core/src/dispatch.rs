use crate::batcher::{BatchRunner, Batcher};
use crate::capability_router::CapabilityRouter;
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::ClientError;
use crate::metadata_oracle::MetadataOracle;
use crate::optimistic::{OptimisticBracket, OptimisticHandle, OptimisticInterpreter};
use crate::plugin::{Plugin, RetryFn};
use crate::reducer::{OpApplier, Reducer};
use crate::registry::{Endpoint, ObserverEntry, ObserverId, RemoveObserverOutcome, Registry};
use crate::transport::Transport;
use async_trait::async_trait;
use conduit_proto::{
    EndpointKey, Metadata, OperationEnvelope, OperationKind, OperationPath, OptimisticDescriptor, ResultEnvelope, Selection,
};
use conduit_signals::{Observer, Unsubscribe};
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};
use tracing::warn;

/// The reactive dispatch engine (§4.4/C6): the single point every proxy
/// call (C9) goes through. Owns the endpoint registry, the batcher, the
/// connection manager, and the plugin list, and routes each operation by
/// kind to the capability router.
pub struct Dispatcher {
    registry: Registry,
    connection: Arc<ConnectionManager>,
    router: CapabilityRouter,
    plugins: Vec<Arc<dyn Plugin>>,
    applier: Arc<dyn OpApplier>,
    optimistic: Option<OptimisticBracket>,
    batcher: Arc<Batcher<BatchRunnerAdapter>>,
    config: ClientConfig,
}

struct BatchRunnerAdapter(Weak<Dispatcher>);

#[async_trait]
impl BatchRunner for BatchRunnerAdapter {
    async fn run_batched_query(&self, path: OperationPath, input: Option<serde_json::Value>, selection: Selection) -> Result<serde_json::Value, ClientError> {
        let dispatcher = self.0.upgrade().ok_or(ClientError::Cancelled)?;
        dispatcher.execute_batched_query(path, input, selection).await
    }
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        plugins: Vec<Arc<dyn Plugin>>,
        applier: Arc<dyn OpApplier>,
        optimistic: Option<Arc<dyn OptimisticInterpreter>>,
        config: ClientConfig,
    ) -> Arc<Self> {
        let registry = Registry::new();
        let max_batch_wait = config.max_batch_wait;
        Arc::new_cyclic(|weak: &Weak<Dispatcher>| Dispatcher {
            connection: ConnectionManager::new(Arc::clone(&transport), config.eager_connect),
            router: CapabilityRouter::new(transport),
            plugins,
            applier,
            optimistic: optimistic.map(|interpreter| OptimisticBracket::new(interpreter, registry.clone())),
            batcher: Batcher::with_max_wait(Arc::new(BatchRunnerAdapter(weak.clone())), max_batch_wait),
            registry,
            config,
        })
    }

    /// Applies §C14's configured request timeout hint to an outgoing
    /// envelope, if one was configured. The core never enforces this
    /// itself — it's advisory metadata a transport may honor.
    fn with_configured_timeout(&self, envelope: OperationEnvelope) -> OperationEnvelope {
        match self.config.request_timeout {
            Some(timeout) => envelope.with_timeout(timeout.as_millis() as u64),
            None => envelope,
        }
    }

    pub fn registry(&self) -> &Registry { &self.registry }

    pub async fn metadata(&self) -> Result<Metadata, ClientError> { self.connection.ensure_connected().await }

    async fn apply_before(&self, mut op: OperationEnvelope) -> Result<OperationEnvelope, ClientError> {
        for plugin in &self.plugins {
            op = plugin.before_request(op).await?;
        }
        Ok(op)
    }

    async fn apply_after(&self, mut result: ResultEnvelope, op: &OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        for plugin in &self.plugins {
            result = plugin.after_response(result, op).await?;
        }
        Ok(result)
    }

    /// Feeds a failure through `on_error` plugins in registration order.
    /// Each plugin's `retry` closure re-issues the operation through the
    /// capability router only — not back through `before_request`, so a
    /// plugin can't accidentally recurse into its own error hook.
    async fn apply_on_error<'a>(&'a self, err: ClientError, op: &'a OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        let mut current_err = err;
        let retry: RetryFn<'a> = &move |op: OperationEnvelope| -> BoxFuture<'a, Result<ResultEnvelope, ClientError>> { Box::pin(self.route_raw(op)) };
        for plugin in &self.plugins {
            match plugin.on_error(current_err.clone(), op, retry).await {
                Ok(result) => return Ok(result),
                Err(next_err) => current_err = next_err,
            }
        }
        Err(current_err)
    }

    async fn route_raw(&self, op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        match op.kind {
            OperationKind::Query => self.router.route_query(op).await,
            OperationKind::Mutation => self.router.route_mutation(op).await,
            OperationKind::Subscription => Err(ClientError::protocol("retry of a subscription operation is not supported")),
        }
    }

    fn extract_data(outcome: Result<ResultEnvelope, ClientError>, protocol_violation: &'static str) -> Result<serde_json::Value, ClientError> {
        match outcome {
            Ok(ResultEnvelope::Snapshot { data }) => Ok(data),
            Ok(ResultEnvelope::Ops { .. }) => Err(ClientError::protocol(protocol_violation)),
            Ok(ResultEnvelope::Error { error }) => Err(ClientError::Operation(error)),
            Err(err) => Err(err),
        }
    }

    /// Runs one merged-selection query for a flushed batch group (§4.3).
    /// Also assigns the result to the endpoint so a later `subscribe` call
    /// on the same key starts from a warm cache.
    async fn execute_batched_query(&self, path: OperationPath, input: Option<serde_json::Value>, selection: Selection) -> Result<serde_json::Value, ClientError> {
        self.metadata().await?;
        let key = EndpointKey::new(path.clone(), input.as_ref());
        let envelope = OperationEnvelope::new(path, OperationKind::Query, input).with_select(selection);
        let envelope = self.with_configured_timeout(envelope);
        let envelope = self.apply_before(envelope).await?;
        let op_for_after = envelope.clone();

        let outcome = match self.router.route_query(envelope).await {
            Ok(result) => self.apply_after(result, &op_for_after).await,
            Err(err) => self.apply_on_error(err, &op_for_after).await,
        };
        let data = Self::extract_data(outcome, "query result arrived as `ops`, which only a subscription may send")?;

        let endpoint = self.registry.get_or_create(&key);
        endpoint.distribute_data(data.clone());
        Ok(data)
    }

    /// One-shot query, batched with any other query on the same endpoint
    /// key issued in this microtask.
    pub async fn query_once(self: &Arc<Self>, path: OperationPath, input: Option<serde_json::Value>, selection: Selection) -> Result<serde_json::Value, ClientError> {
        self.metadata().await?;
        let rx = self.batcher.enqueue(path, input, selection);
        rx.await.map_err(|_| ClientError::Cancelled)?
    }

    /// Registers an observer on the endpoint for `(path, input)`, starting
    /// or restarting the server subscription as required by §4.2's
    /// contract, and returns an explicit-call unsubscribe handle.
    pub async fn subscribe(
        self: &Arc<Self>,
        path: OperationPath,
        input: Option<serde_json::Value>,
        selection: Selection,
        observer: Arc<dyn Observer<serde_json::Value, ClientError>>,
    ) -> Result<Unsubscribe, ClientError> {
        self.metadata().await?;
        let key = EndpointKey::new(path.clone(), input.as_ref());
        let endpoint = self.registry.get_or_create(&key);
        let observer_id = ObserverId::new();
        let outcome = endpoint.add_observer(ObserverEntry { id: observer_id, selection, observer });

        if endpoint.reserve_subscription() {
            if let Err(err) = self.start_subscription(path.clone(), input.clone(), &endpoint).await {
                endpoint.take_server_handle();
                self.evict_observer(&endpoint, &key, observer_id);
                return Err(err);
            }
        } else if outcome.is_expanded {
            if let Err(err) = self.restart_subscription(path.clone(), input.clone(), &endpoint).await {
                self.evict_observer(&endpoint, &key, observer_id);
                return Err(err);
            }
        } else {
            endpoint.replay_to(observer_id);
        }

        let registry = self.registry.clone();
        Ok(Unsubscribe::new(move || {
            let Some(endpoint) = registry.get(&key) else { return };
            Self::teardown_if_empty(&registry, &key, endpoint.remove_observer(observer_id));
        }))
    }

    /// Removes an observer that was just added but whose subscription
    /// attempt failed, so a failed `subscribe` never leaks an
    /// `ObserverEntry` the caller has no `Unsubscribe` handle to reach
    /// (the caller only gets the `Err`). Mirrors the cleanup the returned
    /// `Unsubscribe` closure performs on the happy path.
    fn evict_observer(&self, endpoint: &Endpoint, key: &EndpointKey, observer_id: ObserverId) {
        Self::teardown_if_empty(&self.registry, key, endpoint.remove_observer(observer_id));
    }

    fn teardown_if_empty(registry: &Registry, key: &EndpointKey, outcome: RemoveObserverOutcome) {
        match outcome {
            RemoveObserverOutcome::StillSubscribed => {}
            RemoveObserverOutcome::NowEmpty { server_handle } => {
                if let Some(handle) = server_handle {
                    handle.unsubscribe();
                }
                registry.remove(key);
            }
        }
    }

    async fn start_subscription(self: &Arc<Self>, path: OperationPath, input: Option<serde_json::Value>, endpoint: &Endpoint) -> Result<(), ClientError> {
        let selection = endpoint.merged_selection().unwrap_or(Selection::Include);
        let envelope = OperationEnvelope::new(path.clone(), OperationKind::Subscription, input).with_select(selection.clone());
        let envelope = self.with_configured_timeout(envelope);
        let envelope = self.apply_before(envelope).await?;

        let metadata = self.metadata().await?;
        let oracle = MetadataOracle::new(&metadata);
        let route = oracle.route(path.as_str(), Some(&selection));

        let stream = self.router.route_subscription(envelope, route.requires_stream).await?;
        let reducer = Reducer::new(endpoint.clone(), Arc::clone(&self.applier));
        let handle = stream.subscribe(Box::new(reducer));
        endpoint.set_server_handle(handle);
        Ok(())
    }

    /// Tears down the current server handle and starts a fresh subscription
    /// with the newly expanded merged selection. Stale (narrower) data is
    /// not replayed to the triggering observer; it waits for the next
    /// snapshot, per §4.2. On failure the old handle is already gone, which
    /// leaves every existing observer without a live subscription — the
    /// caller (`subscribe`) evicts the observer that triggered the expansion
    /// so at least the one observer with no reachable `Unsubscribe` doesn't
    /// linger in the registry.
    async fn restart_subscription(self: &Arc<Self>, path: OperationPath, input: Option<serde_json::Value>, endpoint: &Endpoint) -> Result<(), ClientError> {
        if let Some(handle) = endpoint.take_server_handle() {
            handle.unsubscribe();
        }
        if !endpoint.reserve_subscription() {
            warn!(%path, "restart_subscription raced a concurrent reservation; leaving it to the other caller");
            return Ok(());
        }
        if let Err(err) = self.start_subscription(path, input, endpoint).await {
            endpoint.take_server_handle();
            return Err(err);
        }
        Ok(())
    }

    /// Dispatches a mutation, bracketing it with an optimistic apply/
    /// confirm/rollback cycle when the caller supplies a descriptor
    /// (§4.10/C10).
    pub async fn mutate(
        self: &Arc<Self>,
        path: OperationPath,
        input: Option<serde_json::Value>,
        optimistic_descriptor: Option<OptimisticDescriptor>,
    ) -> Result<(serde_json::Value, Option<OptimisticHandle>), ClientError> {
        self.metadata().await?;

        let handle = match (&optimistic_descriptor, &self.optimistic) {
            (Some(descriptor), Some(bracket)) => Some(bracket.begin(descriptor, input.as_ref()).await?),
            (Some(_), None) => {
                return Err(ClientError::configuration("mutation declares an optimistic descriptor but no interpreter is configured"));
            }
            (None, _) => None,
        };

        let envelope = OperationEnvelope::new(path, OperationKind::Mutation, input);
        let envelope = self.with_configured_timeout(envelope);
        let envelope = self.apply_before(envelope).await?;
        let op_for_after = envelope.clone();
        let outcome = match self.router.route_mutation(envelope).await {
            Ok(result) => self.apply_after(result, &op_for_after).await,
            Err(err) => self.apply_on_error(err, &op_for_after).await,
        };
        let data = Self::extract_data(outcome, "mutation result arrived as `ops`, which only a subscription may send");

        if let (Some(handle), Some(bracket)) = (&handle, &self.optimistic) {
            bracket.settle(handle, data.as_ref()).await?;
        }

        data.map(|d| (d, handle))
    }
}
