/*!
Listener fan-out primitives shared by the conduit dispatch engine.

Two shapes are provided:
- [`broadcast`]: zero-payload "something changed" notification, used where a
  consumer only needs to know to re-derive state (e.g. a `LiveQuery`-style
  handle tracking membership changes).
- [`listener`]: payload-carrying `next`/`error`/`complete` delivery, used by
  the endpoint registry to fan filtered data out to individual observers.

This crate intentionally does not implement a general dependency-tracking
signals graph (memoized derivations, framework effects, `CurrentObserver`
stacks) — that belongs to per-framework reactivity adapters, which are an
external collaborator of the dispatch engine, not part of it.
*/

pub mod broadcast;
pub mod listener;

pub use broadcast::{Broadcast, IntoListener, Listener, ListenerGuard};
pub use listener::{BoxObserver, Observer, Unsubscribe};
