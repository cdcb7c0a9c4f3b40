use crate::error::ClientError;
use conduit_proto::{expanded, merge_all, selections_equal, EndpointKey, Selection};
use conduit_signals::{Observer, Unsubscribe};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub use conduit_proto::ObserverId;

/// A registered consumer of an endpoint's stream. `selection` is frozen at
/// registration time — wanting more requires a new observer (§3 invariant).
pub struct ObserverEntry {
    pub id: ObserverId,
    pub selection: Selection,
    pub observer: Arc<dyn Observer<serde_json::Value, ClientError>>,
}

/// Outcome of [`Endpoint::add_observer`]: whether the merged selection
/// changed at all, and whether it *expanded* (gained a leaf path), which is
/// what decides re-subscription in the reducer/dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddObserverOutcome {
    pub selection_changed: bool,
    pub is_expanded: bool,
}

/// Outcome of [`Endpoint::remove_observer`].
pub enum RemoveObserverOutcome {
    StillSubscribed,
    /// Observer count reached zero. Carries the server handle (if any) so
    /// the caller tears it down and erases the endpoint from the registry —
    /// both in the same call, per the §8 testable property.
    NowEmpty { server_handle: Option<Unsubscribe> },
}

struct MutableState {
    data: Option<serde_json::Value>,
    error: Option<ClientError>,
    completed: bool,
    observers: BTreeMap<ObserverId, ObserverEntry>,
    /// `None` while the endpoint has no observers yet (the registry creates
    /// an endpoint before its first observer in the batched-query path, so
    /// this is a real, reachable state, not just a theoretical one). Once an
    /// observer exists this is always `Some`; `Some(Selection::Include)` is
    /// the "any observer wants everything" coarsest case from §3.
    merged_selection: Option<Selection>,
    server_handle: Option<Unsubscribe>,
    is_subscribed: bool,
}

/// One `(path, input)` server conversation: its last payload, its error, and
/// the observers currently watching it. Reference-counted by observer count
/// per §5 resource policy.
#[derive(Clone)]
pub struct Endpoint(Arc<Inner>);

struct Inner {
    key: EndpointKey,
    state: Mutex<MutableState>,
}

impl Endpoint {
    fn new(key: EndpointKey) -> Self {
        Self(Arc::new(Inner {
            key,
            state: Mutex::new(MutableState {
                data: None,
                error: None,
                completed: false,
                observers: BTreeMap::new(),
                merged_selection: None,
                server_handle: None,
                is_subscribed: false,
            }),
        }))
    }

    pub fn key(&self) -> &EndpointKey { &self.0.key }

    /// Snapshot of `(data, error, completed)` without touching observers —
    /// backs `QueryResult::value`.
    pub fn peek(&self) -> (Option<serde_json::Value>, Option<ClientError>, bool) {
        let s = self.0.state.lock().expect("endpoint state poisoned");
        (s.data.clone(), s.error.clone(), s.completed)
    }

    pub fn merged_selection(&self) -> Option<Selection> { self.0.state.lock().expect("endpoint state poisoned").merged_selection.clone() }

    pub fn is_subscribed(&self) -> bool { self.0.state.lock().expect("endpoint state poisoned").is_subscribed }

    pub fn observer_count(&self) -> usize { self.0.state.lock().expect("endpoint state poisoned").observers.len() }

    /// Reserve the subscription slot before the async handshake races —
    /// `is_subscribed=true` implies either a handle already landed or an
    /// attempt is in flight (§3 invariant).
    pub fn reserve_subscription(&self) -> bool {
        let mut s = self.0.state.lock().expect("endpoint state poisoned");
        if s.is_subscribed {
            false
        } else {
            s.is_subscribed = true;
            true
        }
    }

    pub fn set_server_handle(&self, handle: Unsubscribe) {
        let mut s = self.0.state.lock().expect("endpoint state poisoned");
        s.server_handle = Some(handle);
    }

    /// Tear down the current server handle and clear the subscribed flag —
    /// used on re-subscription (selection expanded) and on last-observer
    /// cleanup.
    pub(crate) fn take_server_handle(&self) -> Option<Unsubscribe> {
        let mut s = self.0.state.lock().expect("endpoint state poisoned");
        s.is_subscribed = false;
        s.server_handle.take()
    }

    /// Insert an observer, recompute the merged selection, and report
    /// whether it changed/expanded. The caller is responsible for acting on
    /// `is_expanded` (restart the server subscription) vs not (replay
    /// cached state to the new observer only) per §4.2.
    pub fn add_observer(&self, entry: ObserverEntry) -> AddObserverOutcome {
        let mut s = self.0.state.lock().expect("endpoint state poisoned");
        let prev = s.merged_selection.clone();
        s.observers.insert(entry.id, entry);
        let next = merge_all(s.observers.values().map(|o| &o.selection));
        s.merged_selection = next.clone();

        let selection_changed = match (&prev, &next) {
            (None, None) => false,
            (None, Some(_)) | (Some(_), None) => true,
            (Some(p), Some(n)) => !selections_equal(p, n),
        };
        let is_expanded = match (&prev, &next) {
            (None, _) => false, // first observer ever: nothing to expand relative to
            (Some(p), Some(n)) => expanded(p, n),
            (Some(_), None) => false, // unreachable: merge_all only returns None for zero observers
        };
        AddObserverOutcome { selection_changed, is_expanded }
    }

    /// Remove an observer and recompute the merge. If this was the last
    /// observer, returns the server handle for synchronous teardown.
    pub fn remove_observer(&self, id: ObserverId) -> RemoveObserverOutcome {
        let now_empty = {
            let mut s = self.0.state.lock().expect("endpoint state poisoned");
            s.observers.remove(&id);
            s.merged_selection = merge_all(s.observers.values().map(|o| &o.selection));
            s.observers.is_empty()
        };
        if now_empty {
            RemoveObserverOutcome::NowEmpty { server_handle: self.take_server_handle() }
        } else {
            RemoveObserverOutcome::StillSubscribed
        }
    }

    /// Replay cached state to exactly one observer — used when a new
    /// observer joins an already-subscribed, non-expanding endpoint (§4.2:
    /// "replay current cached state to the newly added observer only").
    pub fn replay_to(&self, id: ObserverId) {
        let (observer, selection, data, error, completed) = {
            let s = self.0.state.lock().expect("endpoint state poisoned");
            let Some(entry) = s.observers.get(&id) else { return };
            (entry.observer.clone(), entry.selection.clone(), s.data.clone(), s.error.clone(), s.completed)
        };
        if let Some(data) = data {
            observer.next(conduit_proto::filter(&data, &selection));
        }
        if let Some(error) = error {
            observer.error(error);
        }
        if completed {
            observer.complete();
        }
    }

    /// Assign new baseline data, clear the error, and fan the filtered
    /// projection out to every observer. Locks are released before any
    /// observer callback runs (mirrors `Broadcast::send`'s clone-then-call
    /// discipline).
    pub fn distribute_data(&self, data: serde_json::Value) {
        let targets: Vec<(Arc<dyn Observer<serde_json::Value, ClientError>>, Selection)> = {
            let mut s = self.0.state.lock().expect("endpoint state poisoned");
            s.data = Some(data.clone());
            s.error = None;
            s.observers.values().map(|o| (o.observer.clone(), o.selection.clone())).collect()
        };
        for (observer, selection) in targets {
            observer.next(conduit_proto::filter(&data, &selection));
        }
    }

    /// Distribute an error without touching `data` (§7: stale-but-valid
    /// state stays visible through errors).
    pub fn distribute_error(&self, err: ClientError) {
        let targets: Vec<Arc<dyn Observer<serde_json::Value, ClientError>>> = {
            let mut s = self.0.state.lock().expect("endpoint state poisoned");
            s.error = Some(err.clone());
            s.observers.values().map(|o| o.observer.clone()).collect()
        };
        for observer in targets {
            observer.error(err.clone());
        }
    }

    pub fn distribute_complete(&self) {
        let targets: Vec<Arc<dyn Observer<serde_json::Value, ClientError>>> = {
            let mut s = self.0.state.lock().expect("endpoint state poisoned");
            s.completed = true;
            s.observers.values().map(|o| o.observer.clone()).collect()
        };
        for observer in targets {
            observer.complete();
        }
    }

    /// Apply an incremental `ops` message to the existing baseline via an
    /// externally injected function, then distribute the new baseline.
    /// Requires `data` already be set — callers must check `has_baseline`
    /// first (§4.5: an `ops` before any `snapshot` is ignored, not applied).
    pub fn has_baseline(&self) -> bool { self.0.state.lock().expect("endpoint state poisoned").data.is_some() }

    pub fn apply_ops(&self, ops: &[serde_json::Value], apply: &dyn Fn(&serde_json::Value, &[serde_json::Value]) -> serde_json::Value) {
        let baseline = {
            let s = self.0.state.lock().expect("endpoint state poisoned");
            match &s.data {
                Some(d) => d.clone(),
                None => {
                    warn!(endpoint = %self.0.key, "ops message with no baseline — ignoring (protocol error on sender side)");
                    return;
                }
            }
        };
        let next = apply(&baseline, ops);
        self.distribute_data(next);
    }
}

/// Map from [`EndpointKey`] to [`Endpoint`]. `get_or_create` is the only way
/// an endpoint comes into being; removal happens in `Endpoint::remove_observer`'s
/// caller once observer count hits zero.
#[derive(Clone, Default)]
pub struct Registry(Arc<DashMap<EndpointKey, Endpoint>>);

impl Registry {
    pub fn new() -> Self { Self(Arc::new(DashMap::new())) }

    pub fn get_or_create(&self, key: &EndpointKey) -> Endpoint {
        self.0.entry(key.clone()).or_insert_with(|| { debug!(%key, "endpoint created"); Endpoint::new(key.clone()) }).clone()
    }

    pub fn get(&self, key: &EndpointKey) -> Option<Endpoint> { self.0.get(key).map(|e| e.clone()) }

    pub fn remove(&self, key: &EndpointKey) {
        if self.0.remove(key).is_some() {
            debug!(%key, "endpoint destroyed");
        }
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
