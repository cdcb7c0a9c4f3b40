use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::optimistic::OptimisticHandle;
use conduit_proto::{filter, EndpointKey, OperationKind, OperationPath, Selection};
use conduit_signals::{Observer, Unsubscribe};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The shape a proxy call admits (§4.9): either a bare input object, or a
/// descriptor with `input`/`select` hoisted out. Any value that isn't the
/// `{ input?, select? }` shape is treated as raw input, same as the source
/// pattern's "anything else is input" rule.
pub enum CallDescriptor {
    Input(serde_json::Value),
    NoInput,
    Shaped { input: Option<serde_json::Value>, select: Option<Selection> },
}

impl CallDescriptor {
    fn split(self) -> (Option<serde_json::Value>, Selection) {
        match self {
            CallDescriptor::Input(v) => (Some(v), Selection::Include),
            CallDescriptor::NoInput => (None, Selection::Include),
            CallDescriptor::Shaped { input, select } => (input, select.unwrap_or(Selection::Include)),
        }
    }
}

/// What a proxy call settles to: a cached query/subscription handle, or an
/// already-settled mutation result.
pub enum ProxyOutcome {
    Query(Arc<QueryResult>),
    Mutated { data: serde_json::Value, optimistic: Option<OptimisticHandle> },
}

/// Cache of `QueryResult` handles keyed by `(endpoint_key, selection)`, so
/// repeated proxy calls with the same path/input/selection return the same
/// handle (§4.9 — load-bearing for reactive frameworks that key memoization
/// off handle identity). Selections are compared by their flattened leaf-path
/// set, matching the algebra's equality definition, since `Selection`
/// contains a `serde_json::Value` and so isn't directly hashable.
#[derive(Default)]
struct QueryResultCache(DashMap<(EndpointKey, BTreeSet<String>), Arc<QueryResult>>);

impl QueryResultCache {
    fn get_or_create(&self, dispatcher: Arc<Dispatcher>, path: OperationPath, input: Option<serde_json::Value>, selection: Selection) -> Arc<QueryResult> {
        let key = EndpointKey::new(path.clone(), input.as_ref());

        // §5 resource policy: a `QueryResult` handle is supposed to die with
        // its endpoint. There's no push notification wired from endpoint
        // teardown back to this cache (that would mean the dispatch engine
        // holding a strong reference into the proxy layer above it, just to
        // chase a cycle back to itself), so eviction is lazy: the first
        // lookup after the endpoint is gone drops whatever was cached for
        // this key before minting a fresh handle. A stale handle still
        // behaves correctly in the meantime — `value`/`subscribe` always
        // resolve against the live registry — so the only thing delayed is
        // memoization identity, not correctness.
        if dispatcher.registry().get(&key).is_none() {
            self.0.retain(|(k, _), _| k != &key);
        }

        let cache_key = (key, selection.flatten());
        self.0
            .entry(cache_key)
            .or_insert_with(|| Arc::new(QueryResult { dispatcher, path, input, selection }))
            .clone()
    }
}

/// Handle returned to callers for a query or subscription-shaped call
/// (§3's `QueryResult`). Exposes a synchronous peek, a forced one-shot
/// fetch, a narrower derived handle, and observer subscription — four
/// entry points rather than one overloaded thenable object, per §9's
/// "express as a variant with explicit await/subscribe entry points".
pub struct QueryResult {
    dispatcher: Arc<Dispatcher>,
    path: OperationPath,
    input: Option<serde_json::Value>,
    selection: Selection,
}

impl QueryResult {
    /// Synchronous peek at the endpoint's cached data, filtered through
    /// this handle's selection. `None` if the endpoint doesn't exist yet or
    /// has no data.
    pub fn value(&self) -> Option<serde_json::Value> {
        let key = EndpointKey::new(self.path.clone(), self.input.as_ref());
        let endpoint = self.dispatcher.registry().get(&key)?;
        let (data, _, _) = endpoint.peek();
        data.map(|d| filter(&d, &self.selection))
    }

    /// Forces a fetch — batched with any other `then()` on the same
    /// endpoint key issued in the same microtask.
    pub async fn then(&self) -> Result<serde_json::Value, ClientError> {
        self.dispatcher.query_once(self.path.clone(), self.input.clone(), self.selection.clone()).await
    }

    /// Registers a live observer, starting or joining the underlying server
    /// subscription per §4.2.
    pub async fn subscribe(&self, observer: Arc<dyn Observer<serde_json::Value, ClientError>>) -> Result<Unsubscribe, ClientError> {
        self.dispatcher.subscribe(self.path.clone(), self.input.clone(), self.selection.clone(), observer).await
    }

    /// Derives a handle to the same endpoint with a different (typically
    /// narrower) selection. Does not itself create an observer.
    pub fn select(self: &Arc<Self>, selection: Selection) -> QueryResult {
        QueryResult { dispatcher: Arc::clone(&self.dispatcher), path: self.path.clone(), input: self.input.clone(), selection }
    }
}

/// One node of the opaque namespace-mirror call surface (§4.9/C9, §9
/// "source pattern: opaque namespace mirror"). `field` extends the dotted
/// path; `call` executes dispatch at the current path. The original's
/// recursive property-access membrane becomes an explicit `field` method
/// here — Rust has no dynamic property interception, and a generated,
/// statically typed mirror belongs to the schema/type-builder layer this
/// core treats as external (§6).
#[derive(Clone)]
pub struct ProxyNode {
    dispatcher: Arc<Dispatcher>,
    cache: Arc<QueryResultCache>,
    path: OperationPath,
}

impl ProxyNode {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self { Self { dispatcher, cache: Arc::new(QueryResultCache::default()), path: OperationPath::new("") } }

    pub fn field(&self, segment: &str) -> ProxyNode {
        let path = if self.path.as_str().is_empty() { OperationPath::new(segment) } else { self.path.join(segment) };
        ProxyNode { dispatcher: Arc::clone(&self.dispatcher), cache: Arc::clone(&self.cache), path }
    }

    pub fn path(&self) -> &OperationPath { &self.path }

    /// Executes dispatch at this node's path. Routes to a mutation
    /// immediately, or to a cached `QueryResult` for anything else — the
    /// metadata oracle, not the call site, decides which (§4.7/C8).
    pub async fn call(&self, descriptor: CallDescriptor) -> Result<ProxyOutcome, ClientError> {
        let (input, selection) = descriptor.split();
        let metadata = self.dispatcher.metadata().await?;
        let kind = metadata.resolve_operation(self.path.as_str()).map(|op| op.kind).unwrap_or(OperationKind::Query);

        if kind == OperationKind::Mutation {
            let optimistic_descriptor = metadata.resolve_operation(self.path.as_str()).and_then(|op| op.optimistic.clone());
            let (data, optimistic) = self.dispatcher.mutate(self.path.clone(), input, optimistic_descriptor).await?;
            return Ok(ProxyOutcome::Mutated { data, optimistic });
        }

        Ok(ProxyOutcome::Query(self.cache.get_or_create(Arc::clone(&self.dispatcher), self.path.clone(), input, selection)))
    }
}
