//! Client error types.
//!
//! Connectivity problems never show up here: they are absorbed by the
//! connection manager and surface only as state changes.

use thiserror::Error;

/// Errors returned by [`LiveHandle`](crate::LiveHandle) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// The live-update runtime has shut down.
    #[error("live updates have shut down")]
    Closed,
}

/// Errors raised synchronously while constructing a socket.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint is not a usable URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured
        endpoint: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Endpoint uses a scheme other than `ws` or `wss`.
    #[error("unsupported scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),

    /// Transport refused to open the socket.
    #[error("socket construction failed: {0}")]
    Rejected(String),
}
