//! Error types for the protocol layer.
//!
//! Each crate in Sessionguard defines its own error enum. A
//! `ProtocolError` always means "these bytes are not what we expected",
//! never a network or session problem.

/// Errors that can occur while encoding or decoding protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed JSON, an empty body, or a payload whose
    /// shape doesn't match the target type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload parsed, but violates a protocol rule. For example an
    /// identity payload that is a JSON array instead of an object.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
