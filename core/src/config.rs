use std::time::Duration;

/// Explicit, Rust-value construction parameters for a [`crate::Dispatcher`]
/// (§C14). There is no environment or config-file loading here — every
/// knob is a value the caller passes at construction, the same way the
/// teacher's `Node::new`/`new_durable` take explicit parameters rather than
/// reading configuration out of band. Reading `ClientConfig` from a file or
/// environment variables is left to the caller, not this crate.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) max_batch_wait: Option<Duration>,
    pub(crate) eager_connect: bool,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder { ClientConfigBuilder::default() }
}

impl Default for ClientConfig {
    /// Matches the behavior this crate had before `ClientConfig` existed:
    /// no per-request timeout hint, a single-microtask batch window, and the
    /// handshake launches in the background at construction (§4.6/C7).
    fn default() -> Self { Self { request_timeout: None, max_batch_wait: None, eager_connect: true } }
}

/// Builder for [`ClientConfig`]. Every setter is optional; an unconfigured
/// builder produces the same defaults as `ClientConfig::default()`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    request_timeout: Option<Duration>,
    max_batch_wait: Option<Duration>,
    eager_connect: Option<bool>,
}

impl ClientConfigBuilder {
    /// Stamped onto `meta.timeout_ms` on every outgoing [`conduit_proto::OperationEnvelope`],
    /// for a transport to honor as it sees fit. The core itself never times
    /// out a call on this value — timing out a transport call belongs to
    /// the transport, which knows its own retry/cancellation story.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Widens the query batcher's (§4.3/C4) coalescing window from a single
    /// microtask to this fixed delay: more concurrent callers get a chance
    /// to join the same flushed group, at the cost of added latency on the
    /// first caller in each group.
    pub fn max_batch_wait(mut self, wait: Duration) -> Self {
        self.max_batch_wait = Some(wait);
        self
    }

    /// Whether the handshake is launched in the background immediately at
    /// construction (`true`, the default) or deferred until the first
    /// operation actually needs it (`false`).
    pub fn eager_connect(mut self, eager: bool) -> Self {
        self.eager_connect = Some(eager);
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            max_batch_wait: self.max_batch_wait,
            eager_connect: self.eager_connect.unwrap_or(true),
        }
    }
}
