//! Error types for the live-update core.
//!
//! Connectivity failures are deliberately absent: they are never surfaced as
//! errors, only as [`crate::ConnectionState`] transitions. What remains are
//! wire-level failures around the JSON message envelope.

use thiserror::Error;

/// Errors that can occur while decoding or encoding wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Inbound frame is not a well-formed `{ "type": ..., "data": ... }` object
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Parser diagnostic
        reason: String,
    },

    /// Outbound message could not be serialized
    #[error("failed to encode message of kind {kind:?}: {reason}")]
    Encode {
        /// Kind of the message being encoded
        kind: String,
        /// Serializer diagnostic
        reason: String,
    },
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed { reason: err.to_string() }
    }
}
