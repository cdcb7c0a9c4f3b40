use async_trait::async_trait;
use conduit::core::{Capabilities, ClientError, OperationEnvelope, ResultEnvelope, SubscriptionObserver, SubscriptionStream, Transport};
use conduit::proto::Metadata;
use conduit::signals::{Observer, Unsubscribe};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// One simulated server subscription: holds whatever observer the reducer
/// last attached, so a test can push `snapshot`/`ops`/`error`/`complete`
/// messages into it directly, as if a real transport had received them off
/// the wire.
#[derive(Default)]
pub struct FakeChannel {
    observer: Mutex<Option<SubscriptionObserver>>,
    subscribe_count: AtomicU32,
}

impl FakeChannel {
    pub fn push_snapshot(&self, data: serde_json::Value) { self.with_observer(|o| o.next(ResultEnvelope::Snapshot { data })); }

    pub fn push_ops(&self, ops: Vec<serde_json::Value>) { self.with_observer(|o| o.next(ResultEnvelope::Ops { ops })); }

    pub fn push_error(&self, msg: &str) { self.with_observer(|o| o.error(ClientError::Operation(msg.to_string()))); }

    pub fn push_complete(&self) { self.with_observer(|o| o.complete()); }

    pub fn is_live(&self) -> bool { self.observer.lock().unwrap().is_some() }

    pub fn subscribe_count(&self) -> u32 { self.subscribe_count.load(Ordering::SeqCst) }

    fn with_observer(&self, f: impl FnOnce(&SubscriptionObserver)) {
        if let Some(observer) = &*self.observer.lock().unwrap() {
            f(observer);
        }
    }
}

struct FakeSubscriptionStream {
    channel: Arc<FakeChannel>,
}

impl SubscriptionStream for FakeSubscriptionStream {
    fn subscribe(&self, observer: SubscriptionObserver) -> Unsubscribe {
        self.channel.subscribe_count.fetch_add(1, Ordering::SeqCst);
        *self.channel.observer.lock().unwrap() = Some(observer);
        let channel = Arc::clone(&self.channel);
        Unsubscribe::new(move || {
            channel.observer.lock().unwrap().take();
        })
    }
}

/// In-process stand-in for a real transport (§4.8's collaborator). Queries
/// and mutations are answered from a pre-loaded, per-path FIFO queue;
/// subscriptions hand back a [`FakeChannel`] the test drives directly.
/// Mirrors the fixture style of the teacher's `SledStorageEngine::new_test`
/// — a same-process substitute with no network, configured imperatively by
/// the test rather than by a mock-expectation DSL.
pub struct FakeTransport {
    capabilities: Capabilities,
    metadata: Metadata,
    connect_attempts: AtomicU32,
    fail_connect_times: u32,
    queries: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, ClientError>>>>,
    mutations: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, ClientError>>>>,
    channels: Mutex<HashMap<String, Arc<FakeChannel>>>,
    query_calls: Mutex<HashMap<String, u32>>,
}

impl FakeTransport {
    pub fn new(metadata: Metadata) -> Arc<Self> { Self::with_capabilities(metadata, Capabilities::all()) }

    pub fn with_capabilities(metadata: Metadata, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            metadata,
            connect_attempts: AtomicU32::new(0),
            fail_connect_times: 0,
            queries: Mutex::new(HashMap::new()),
            mutations: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            query_calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn queue_query(&self, path: &str, result: Result<serde_json::Value, ClientError>) {
        self.queries.lock().unwrap().entry(path.to_string()).or_default().push_back(result);
    }

    pub fn queue_mutation(&self, path: &str, result: Result<serde_json::Value, ClientError>) {
        self.mutations.lock().unwrap().entry(path.to_string()).or_default().push_back(result);
    }

    /// How many times `query` was actually invoked for `path` — what the
    /// batching test asserts collapses to one per microtask regardless of
    /// how many `then()` calls were issued.
    pub fn query_calls(&self, path: &str) -> u32 { *self.query_calls.lock().unwrap().get(path).unwrap_or(&0) }

    pub fn channel(&self, path: &str) -> Arc<FakeChannel> { Arc::clone(self.channels.lock().unwrap().entry(path.to_string()).or_default()) }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<Metadata, ClientError> {
        let n = self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_connect_times {
            return Err(ClientError::transport("fake handshake refused"));
        }
        Ok(self.metadata.clone())
    }

    fn capabilities(&self) -> Capabilities { self.capabilities }

    async fn query(&self, op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        *self.query_calls.lock().unwrap().entry(op.path.as_str().to_string()).or_insert(0) += 1;
        let popped = self.queries.lock().unwrap().get_mut(op.path.as_str()).and_then(|q| q.pop_front());
        match popped {
            Some(Ok(data)) => Ok(ResultEnvelope::Snapshot { data }),
            Some(Err(err)) => Err(err),
            None => Err(ClientError::configuration(format!("fake transport: no queued query response for {}", op.path))),
        }
    }

    async fn mutation(&self, op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        let popped = self.mutations.lock().unwrap().get_mut(op.path.as_str()).and_then(|q| q.pop_front());
        match popped {
            Some(Ok(data)) => Ok(ResultEnvelope::Snapshot { data }),
            Some(Err(err)) => Err(err),
            None => Err(ClientError::configuration(format!("fake transport: no queued mutation response for {}", op.path))),
        }
    }

    async fn subscription(&self, op: OperationEnvelope) -> Result<Box<dyn SubscriptionStream>, ClientError> {
        Ok(Box::new(FakeSubscriptionStream { channel: self.channel(op.path.as_str()) }))
    }
}

/// Collects everything delivered to an observer, in order, for later
/// assertion — same role as the teacher's `changeset_watcher` helper, just
/// keeping the three channels (`next`/`error`/`complete`) separate instead of
/// flattening them into one changeset type.
#[derive(Default)]
pub struct Recorder {
    values: Mutex<Vec<serde_json::Value>>,
    errors: Mutex<Vec<String>>,
    completed: Mutex<bool>,
}

impl Recorder {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn values(&self) -> Vec<serde_json::Value> { self.values.lock().unwrap().clone() }

    pub fn error_count(&self) -> usize { self.errors.lock().unwrap().len() }

    pub fn is_completed(&self) -> bool { *self.completed.lock().unwrap() }
}

impl Observer<serde_json::Value, ClientError> for Recorder {
    fn next(&self, value: serde_json::Value) { self.values.lock().unwrap().push(value); }

    fn error(&self, err: ClientError) { self.errors.lock().unwrap().push(err.to_string()); }

    fn complete(&self) { *self.completed.lock().unwrap() = true; }
}
