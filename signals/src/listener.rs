/// Callback surface a caller registers against a live endpoint.
///
/// A bare `Fn(T) + Send + Sync` closure is accepted in place of a full
/// `Observer` (the blanket impl below treats it as `{ next: fn }`), mirroring
/// how channel senders and closures are both accepted as broadcast listeners.
pub trait Observer<T, E = std::convert::Infallible>: Send + Sync + 'static {
    fn next(&self, _value: T) {}
    fn error(&self, _err: E) {}
    fn complete(&self) {}
}

impl<F, T, E> Observer<T, E> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn next(&self, value: T) { self(value) }
}

pub type BoxObserver<T, E> = Box<dyn Observer<T, E>>;

/// A handle returned from `subscribe`. Call `unsubscribe` to remove the
/// observer; forgetting the handle simply leaves the observer registered
/// (there is no implicit drop-based teardown, matching a plain `() => void`
/// callback in the JS original rather than a guard object).
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self { Self(Some(Box::new(f))) }

    /// Idempotent: calling this more than once (or on an already-consumed
    /// handle obtained via `clone`-free reuse) is a no-op.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("Unsubscribe(..)") }
}
