mod common;

use async_trait::async_trait;
use common::{FakeTransport, Recorder};
use conduit::core::{
    ClientConfig, ClientError, EndpointNotifier, OperationKind, OperationMeta, OperationsNode, OptimisticDescriptor, OptimisticInterpreter, TransactionId,
};
use conduit::proto::{Metadata, OperationPath, Selection};
use conduit::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct ReplaceApplier;
impl conduit::core::OpApplier for ReplaceApplier {
    fn apply(&self, baseline: &serde_json::Value, ops: &[serde_json::Value]) -> serde_json::Value {
        let mut out = baseline.clone();
        if let (Some(obj), Some(patch)) = (out.as_object_mut(), ops.first().and_then(|p| p.as_object())) {
            for (k, v) in patch {
                obj.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

fn metadata_with(ops: Vec<(&str, OperationMeta)>) -> Metadata {
    let mut operations = BTreeMap::new();
    for (path, meta) in ops {
        insert_leaf(&mut operations, &path.split('.').collect::<Vec<_>>(), meta);
    }
    Metadata { version: "1".to_string(), operations: OperationsNode::Map(operations), entities: BTreeMap::new() }
}

/// `OperationsNode::resolve` walks a nested tree segment by segment, so a
/// dotted path like `posts.append` needs a `posts -> { append: Leaf }`
/// namespace nesting, not a single flat `"posts.append"` map key.
fn insert_leaf(map: &mut BTreeMap<String, OperationsNode>, segments: &[&str], meta: OperationMeta) {
    match segments {
        [last] => {
            map.insert(last.to_string(), OperationsNode::Leaf(meta));
        }
        [first, rest @ ..] => {
            let child = map.entry(first.to_string()).or_insert_with(|| OperationsNode::Map(BTreeMap::new()));
            if let OperationsNode::Map(children) = child {
                insert_leaf(children, rest, meta);
            }
        }
        [] => unreachable!("split('.') on a non-empty path always yields at least one segment"),
    }
}

fn query_meta() -> OperationMeta { OperationMeta { kind: OperationKind::Query, return_entity_name: None, live: false, optimistic: None } }

fn selection(fields: impl IntoIterator<Item = &'static str>) -> Selection {
    Selection::node(fields.into_iter().map(|f| (f.to_string(), Selection::Include)).collect())
}

fn client(transport: Arc<FakeTransport>) -> Client {
    Client::new(transport, vec![], Arc::new(ReplaceApplier), None, ClientConfig::default())
}

/// Two observers on the same `(path, input)` endpoint with the *same*
/// selection are served by one underlying endpoint and one server
/// subscription; the second joining doesn't expand the merged selection, so
/// it's replayed cached state rather than triggering a re-subscription.
#[tokio::test]
async fn identical_selections_on_one_endpoint_share_a_single_subscription() {
    let transport = FakeTransport::new(metadata_with(vec![("feed", query_meta())]));
    let client = client(transport.clone());

    let node = client.at("feed");
    let a = node.call(conduit::core::CallDescriptor::Shaped { input: None, select: Some(selection(["title"])) }).await.unwrap();
    let b = node.call(conduit::core::CallDescriptor::Shaped { input: None, select: Some(selection(["title"])) }).await.unwrap();

    let (a, b) = match (a, b) {
        (conduit::core::ProxyOutcome::Query(a), conduit::core::ProxyOutcome::Query(b)) => (a, b),
        _ => panic!("expected query outcomes"),
    };

    let ra = Recorder::new();
    let rb = Recorder::new();
    let _ua = a.subscribe(ra.clone()).await.unwrap();
    let _ub = b.subscribe(rb.clone()).await.unwrap();

    let channel = transport.channel("feed");
    assert_eq!(channel.subscribe_count(), 1, "an identical selection joining an already-subscribed endpoint must not re-subscribe");
    channel.push_snapshot(json!({"id": "1", "title": "Hello", "author": "Alice"}));

    assert_eq!(ra.values(), vec![json!({"id": "1", "title": "Hello"})]);
    assert_eq!(rb.values(), vec![json!({"id": "1", "title": "Hello"})]);
}

/// §8 scenario 1, literal: observer A selects `{name}`, observer B selects
/// `{email, phone}` on the same `(path, input)` endpoint. The merger joins
/// them into a single server subscription over the union, and each observer
/// is filtered back down to only the fields it asked for — A never sees
/// `email`/`phone`, B never sees `name`.
#[tokio::test]
async fn disjoint_selections_on_one_endpoint_each_see_their_own_slice() {
    let transport = FakeTransport::new(metadata_with(vec![("user", query_meta())]));
    let client = client(transport.clone());

    let node = client.at("user");
    let input = json!({"id": "1"});
    let a = match node.call(conduit::core::CallDescriptor::Shaped { input: Some(input.clone()), select: Some(selection(["name"])) }).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => panic!("expected a query outcome"),
    };
    let b = match node.call(conduit::core::CallDescriptor::Shaped { input: Some(input), select: Some(selection(["email", "phone"])) }).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => panic!("expected a query outcome"),
    };

    let ra = Recorder::new();
    let rb = Recorder::new();
    let _ua = a.subscribe(ra.clone()).await.unwrap();
    let _ub = b.subscribe(rb.clone()).await.unwrap();

    let channel = transport.channel("user");
    assert_eq!(channel.subscribe_count(), 1, "disjoint selections on the same endpoint must still share one server subscription");
    channel.push_snapshot(json!({"id": "1", "name": "Alice", "email": "a@x", "phone": "555"}));

    assert_eq!(ra.values(), vec![json!({"id": "1", "name": "Alice"})], "A must not see B's fields");
    assert_eq!(rb.values(), vec![json!({"id": "1", "email": "a@x", "phone": "555"})], "B must not see A's fields");
}

/// A second observer whose selection adds a field the first didn't ask for
/// forces a fresh server subscription with the expanded merged selection.
#[tokio::test]
async fn selection_expansion_triggers_resubscription() {
    let transport = FakeTransport::new(metadata_with(vec![("feed", query_meta())]));
    let client = client(transport.clone());
    let node = client.at("feed");

    let narrow = match node.call(conduit::core::CallDescriptor::Shaped { input: None, select: Some(selection(["title"])) }).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };
    let _u1 = narrow.subscribe(Recorder::new()).await.unwrap();

    let channel = transport.channel("feed");
    assert_eq!(channel.subscribe_count(), 1);

    let wider = match node.call(conduit::core::CallDescriptor::Shaped { input: None, select: Some(selection(["title", "author"])) }).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };
    let _u2 = wider.subscribe(Recorder::new()).await.unwrap();

    assert_eq!(channel.subscribe_count(), 2, "expansion must tear down and re-issue the server subscription");
    assert!(channel.is_live());
}

/// Two `then()` calls issued within the same microtask on the same endpoint
/// key coalesce into exactly one transport query call.
#[tokio::test]
async fn microtask_batching_coalesces_concurrent_queries() {
    let transport = FakeTransport::new(metadata_with(vec![("profile", query_meta())]));
    transport.queue_query("profile", Ok(json!({"id": "1", "name": "Alice"})));
    let client = client(transport.clone());
    let node = client.at("profile");

    let q1 = match node.call(conduit::core::CallDescriptor::NoInput).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };
    let q2 = match node.call(conduit::core::CallDescriptor::NoInput).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };

    let (r1, r2) = tokio::join!(q1.then(), q2.then());
    assert_eq!(r1.unwrap(), json!({"id": "1", "name": "Alice"}));
    assert_eq!(r2.unwrap(), json!({"id": "1", "name": "Alice"}));
    assert_eq!(transport.query_calls("profile"), 1);
}

/// An `ops` message delivered before any `snapshot` on a fresh subscription
/// is dropped rather than applied to a nonexistent baseline.
#[tokio::test]
async fn ops_before_snapshot_is_dropped() {
    let transport = FakeTransport::new(metadata_with(vec![("feed", query_meta())]));
    let client = client(transport.clone());
    let node = client.at("feed");

    let q = match node.call(conduit::core::CallDescriptor::NoInput).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };
    let recorder = Recorder::new();
    let _u = q.subscribe(recorder.clone()).await.unwrap();

    let channel = transport.channel("feed");
    channel.push_ops(vec![json!({"title": "ghost edit"})]);
    assert!(recorder.values().is_empty());

    channel.push_snapshot(json!({"id": "1", "title": "Hello"}));
    channel.push_ops(vec![json!({"title": "Hello, edited"})]);

    assert_eq!(recorder.values(), vec![json!({"id": "1", "title": "Hello"}), json!({"id": "1", "title": "Hello, edited"})]);
}

/// Unsubscribing the only observer tears down the server subscription and
/// erases the endpoint, so a later subscribe starts clean.
#[tokio::test]
async fn last_observer_unsubscribe_tears_down_and_removes_endpoint() {
    let transport = FakeTransport::new(metadata_with(vec![("feed", query_meta())]));
    let client = client(transport.clone());
    let node = client.at("feed");

    let q = match node.call(conduit::core::CallDescriptor::NoInput).await.unwrap() {
        conduit::core::ProxyOutcome::Query(q) => q,
        _ => unreachable!(),
    };
    let unsubscribe = q.subscribe(Recorder::new()).await.unwrap();

    let channel = transport.channel("feed");
    assert!(channel.is_live());
    assert_eq!(client.dispatcher().registry().len(), 1);

    unsubscribe.unsubscribe();
    assert!(!channel.is_live(), "the server handle must be torn down explicitly, not left to drop");
    assert_eq!(client.dispatcher().registry().len(), 0);
}

#[derive(Default)]
struct RecordingInterpreter {
    applies: AtomicU32,
    confirms: AtomicU32,
    rollbacks: AtomicU32,
}

#[async_trait]
impl OptimisticInterpreter for RecordingInterpreter {
    async fn apply(&self, _descriptor: &OptimisticDescriptor, _input: Option<&serde_json::Value>, _notifier: &EndpointNotifier) -> Result<TransactionId, ClientError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionId::new())
    }

    async fn confirm(&self, _tx_id: TransactionId, _server_data: &serde_json::Value, _notifier: &EndpointNotifier) -> Result<(), ClientError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx_id: TransactionId, _notifier: &EndpointNotifier) -> Result<(), ClientError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A mutation that declares an optimistic descriptor and then fails rolls
/// back through the interpreter rather than confirming.
#[tokio::test]
async fn optimistic_mutation_rolls_back_on_transport_failure() {
    let optimistic_meta = OperationMeta {
        kind: OperationKind::Mutation,
        return_entity_name: None,
        live: false,
        optimistic: Some(OptimisticDescriptor { descriptor: json!({"op": "append"}) }),
    };
    let transport = FakeTransport::new(metadata_with(vec![("posts.append", optimistic_meta)]));
    transport.queue_mutation("posts.append", Err(ClientError::transport("rejected by server")));

    let interpreter = Arc::new(RecordingInterpreter::default());
    let dispatcher_client =
        Client::new(transport.clone(), vec![], Arc::new(ReplaceApplier), Some(interpreter.clone() as Arc<dyn OptimisticInterpreter>), ClientConfig::default());

    let node = dispatcher_client.at("posts.append");
    let outcome = node.call(conduit::core::CallDescriptor::Input(json!({"text": "hi"}))).await;

    assert!(outcome.is_err());
    assert_eq!(interpreter.applies.load(Ordering::SeqCst), 1);
    assert_eq!(interpreter.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(interpreter.confirms.load(Ordering::SeqCst), 0);
}

/// A mutation declaring an optimistic descriptor with no interpreter
/// configured surfaces as a configuration error rather than silently
/// skipping the bracket.
#[tokio::test]
async fn optimistic_mutation_without_interpreter_is_a_configuration_error() {
    let optimistic_meta = OperationMeta {
        kind: OperationKind::Mutation,
        return_entity_name: None,
        live: false,
        optimistic: Some(OptimisticDescriptor { descriptor: json!({"op": "append"}) }),
    };
    let transport = FakeTransport::new(metadata_with(vec![("posts.append", optimistic_meta)]));
    let client = client(transport);

    let node = client.at("posts.append");
    let err = node.call(conduit::core::CallDescriptor::Input(json!({"text": "hi"}))).await.unwrap_err();
    assert!(matches!(err, ClientError::Configuration(_)));
}

/// `OperationPath::join` is exercised by `Client::at` for multi-segment
/// paths; this just pins that behavior against the dispatcher's own
/// metadata resolution for a nested mutation path.
#[tokio::test]
async fn nested_path_resolves_through_metadata() {
    let transport = FakeTransport::new(metadata_with(vec![("posts.append", OperationMeta { kind: OperationKind::Mutation, return_entity_name: None, live: false, optimistic: None })]));
    transport.queue_mutation("posts.append", Ok(json!({"id": "9"})));
    let client = client(transport);

    let node = client.at("posts.append");
    assert_eq!(node.path(), &OperationPath::new("posts.append"));
    let outcome = node.call(conduit::core::CallDescriptor::Input(json!({"text": "hi"}))).await.unwrap();
    match outcome {
        conduit::core::ProxyOutcome::Mutated { data, .. } => assert_eq!(data, json!({"id": "9"})),
        _ => panic!("expected a mutation outcome"),
    }
}
