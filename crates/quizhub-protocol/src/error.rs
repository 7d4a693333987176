//! Error types for the protocol layer.
//!
//! Each crate in Quizhub defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in turning bytes into
//! messages (or back), not in networking or game flow.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, or a frame that is not a
    /// `{"type": ..., "payload": ...}` object.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope decoded, but its `type` tag is not one clients may
    /// send.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The `type` tag is known but the payload has the wrong shape,
    /// e.g. an `answer` whose `answer` field is missing or not a string.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The message type whose payload was rejected.
        kind: String,
        /// What serde found wrong with it.
        #[source]
        source: serde_json::Error,
    },
}
