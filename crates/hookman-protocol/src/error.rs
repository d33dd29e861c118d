//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the problem is in turning envelopes into
//! text or text back into envelopes, never in networking.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of an outbound command failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// An inbound frame is not well-formed JSON, or lacks a string `type`.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
