use thiserror::Error;

/// The four externally-triggered error kinds from the spec's error design,
/// plus cancellation. Mirrors the teacher's flat `RetrievalError` shape: one
/// enum, `#[error("...")]` messages, boxed-dyn catch-alls only where a
/// dependency genuinely hands back an opaque error.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    /// Network/serialization failure from the transport. Not retried by the
    /// core; a `Plugin::on_error` hook may retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// A violation of the wire contract the core itself detected: `ops`
    /// before any `snapshot`, a `snapshot`/`ops` tag mismatch on a mutation,
    /// a transport missing a capability an operation requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `{ $: "error" }` from the server.
    #[error("operation error: {0}")]
    Operation(String),

    /// Misconfiguration detectable at client construction or at the first
    /// offending operation: a plugin threw synchronously, a transport lacks
    /// a capability a route requires, an optimistic layer is absent when an
    /// operation declares an optimistic descriptor.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unsubscribing after the endpoint was already torn down. Always
    /// recoverable — callers may treat this as success (idempotent).
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self { ClientError::Protocol(msg.into()) }

    pub fn configuration(msg: impl Into<String>) -> Self { ClientError::Configuration(msg.into()) }

    pub fn transport(msg: impl Into<String>) -> Self { ClientError::Transport(msg.into()) }

    /// Operation errors, transport errors, and protocol errors are all
    /// surfaced the same way to observers (§7 propagation policy);
    /// configuration errors are not — they are thrown at construction or at
    /// the first offending call, never broadcast to observers.
    pub fn is_observable(&self) -> bool { !matches!(self, ClientError::Configuration(_) | ClientError::Cancelled) }
}
