//! Async runtime for status page live updates
//!
//! Drives the `statuslive-core` state machines on tokio and exposes them to
//! views through one shared, cloneable capability.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  commands   ┌──────────────────────────────┐  open/close  ┌───────────┐
//! │ LiveHandle │ ──────────> │ Runtime task                 │ ───────────> │ Transport │
//! │ (per view) │ <────────── │  ConnectionManager           │ <─────────── │ (socket)  │
//! └────────────┘  snapshots  │  Dispatcher, UpdateTrigger   │ socket events└───────────┘
//!                 events     └──────────────────────────────┘
//! ```
//!
//! A single task owns the connection manager, dispatcher, trigger policy and
//! the socket. Everything else talks to it through channels, so there is
//! exactly one socket per [`LiveUpdates`] and no locks anywhere.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod handle;
mod runtime;
pub mod transport;
pub mod websocket;

pub use config::LiveConfig;
pub use env::SystemEnv;
pub use error::{LiveError, TransportError};
pub use handle::{
    Freshness, LiveEvent, LiveHandle, LiveUpdates, MessageSubscription, Snapshot, Subscription,
};
pub use transport::{SocketEvent, SocketEvents, SocketHandle, Transport};
pub use websocket::WebSocketTransport;
