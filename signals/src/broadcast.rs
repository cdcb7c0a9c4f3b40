use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Weak};

/// A listener that can be called when broadcast notifications are sent.
pub type Listener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Trait for types that can be converted into broadcast listeners.
pub trait IntoListener {
    fn into_listener(self) -> Listener;
}

/// A broadcast sender that notifies multiple subscribers without payload data.
/// Used where callers only need to know "something changed", not what.
#[derive(Clone)]
pub struct Broadcast(Arc<Inner>);
struct Inner {
    listeners: std::sync::RwLock<HashMap<usize, Listener>>,
    next_id: AtomicUsize,
}

/// A listen-only reference to a broadcast.
pub struct Ref<'a>(&'a Broadcast);

/// A subscription handle that unsubscribes when dropped.
pub struct ListenerGuard {
    inner: Weak<Inner>,
    id: usize,
}

impl Broadcast {
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: std::sync::RwLock::new(HashMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Sends a notification to all active listeners.
    pub fn send(&self) {
        let subscribers = {
            let listeners = self.0.listeners.read().expect("listeners lock poisoned");
            listeners.values().cloned().collect::<Vec<_>>()
        };
        for callback in subscribers {
            callback();
        }
    }

    pub fn reference(&self) -> Ref { Ref(self) }

    pub fn listener_count(&self) -> usize { self.0.listeners.read().expect("listeners lock poisoned").len() }
}

impl Default for Broadcast {
    fn default() -> Self { Self::new() }
}

impl<'a> Ref<'a> {
    pub fn listen<L>(&self, listener: L) -> ListenerGuard
    where L: IntoListener {
        let id = self.0.0.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.0.0.listeners.write().expect("listeners lock poisoned").insert(id, listener.into_listener());
        ListenerGuard { inner: Arc::downgrade(&self.0.0), id }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.write().expect("listeners lock poisoned").remove(&self.id);
        }
    }
}

impl<F> IntoListener for F
where F: Fn() + Send + Sync + 'static
{
    fn into_listener(self) -> Listener { Arc::new(self) }
}
