//! Core state machines for status page live updates
//!
//! Pure state machines for keeping status page views fresh over a single
//! shared push connection. Nothing in this crate performs I/O or owns a timer:
//! callers pass the current time in and execute the returned actions, which
//! keeps every transition deterministic and testable with a virtual clock.
//!
//! # Components
//!
//! - [`ConnectionManager`]: Socket lifecycle, exponential backoff, health check
//! - [`Dispatcher`]: Frame parsing, last message, fan-out to handlers
//! - [`UpdateTrigger`]: Which messages make views reload, and when
//! - [`StatusIndicator`]: Connection status affordance shown to users
//! - [`Environment`]: Time source abstraction (real or virtual)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod indicator;
pub mod message;
pub mod trigger;

pub use connection::{
    ConnectionAction, ConnectionManager, ConnectionState, ReconnectConfig, RetryState, SocketId,
};
pub use dispatcher::{Dispatcher, HandlerId, MessageHandler};
pub use env::{Environment, Timepoint};
pub use error::MessageError;
pub use indicator::{StatusIndicator, Tone};
pub use message::{InboundMessage, OutboundMessage};
pub use trigger::{
    PolicyConfig, ReloadReason, SubscriberId, TriggerAction, TriggerKind, TriggerSet,
    UpdateTrigger,
};
