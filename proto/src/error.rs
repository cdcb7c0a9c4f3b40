use thiserror::Error;

/// Failure modes that can arise while canonicalizing wire data — kept
/// separate from the dispatch engine's `ClientError` (in `conduit-core`)
/// since these are pure data errors with no notion of a transport or an
/// endpoint.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("input could not be serialized to canonical JSON: {0}")]
    Canonicalization(#[from] serde_json::Error),
}
