//! Socket transport abstraction.
//!
//! The runtime never performs socket I/O itself. It asks a [`Transport`] to
//! open a socket for a [`SocketId`]; the transport reports progress as
//! [`SocketEvent`]s tagged with that ID on a shared channel, and takes
//! outgoing text through the returned [`SocketHandle`].

use std::time::Duration;

use statuslive_core::SocketId;
use tokio::{runtime::Handle, sync::mpsc, task::AbortHandle};

use crate::error::TransportError;

/// How long a closing socket task may spend on the close handshake before it
/// is aborted.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Channel on which transports report socket progress.
pub type SocketEvents = mpsc::UnboundedSender<(SocketId, SocketEvent)>;

/// Asynchronous socket progress.
///
/// Follows browser socket semantics: a failed handshake reports `Error`
/// followed by `Closed`, and every socket that opened ends with `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed
    Opened,
    /// Text frame received
    Frame(String),
    /// Socket-level error
    Error(String),
    /// Socket closed, for any reason
    Closed,
}

/// Opens sockets to an endpoint.
pub trait Transport: Send + 'static {
    /// Start opening a socket to `endpoint`.
    ///
    /// Must return without waiting for the handshake. Progress is reported on
    /// `events`, tagged with `socket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot even be constructed, e.g. the
    /// endpoint is malformed. No events follow in that case.
    fn open(
        &self,
        endpoint: &str,
        socket: SocketId,
        events: SocketEvents,
    ) -> Result<SocketHandle, TransportError>;
}

/// Runtime's end of an open or opening socket.
#[derive(Debug)]
pub struct SocketHandle {
    /// Outgoing text frames
    outgoing: mpsc::UnboundedSender<String>,
    /// Task running the socket, aborted if it outlives the close grace period
    task: Option<AbortHandle>,
}

impl SocketHandle {
    /// Create a handle.
    ///
    /// Closing drops `outgoing`; the transport sees the channel close and
    /// shuts the socket down cleanly. `task`, if any, is aborted once
    /// [`CLOSE_GRACE`] has passed.
    pub fn new(outgoing: mpsc::UnboundedSender<String>, task: Option<AbortHandle>) -> Self {
        Self { outgoing, task }
    }

    /// Queue a text frame. Returns false if the socket is gone.
    pub fn send(&self, text: String) -> bool {
        self.outgoing.send(text).is_ok()
    }

    /// Close the socket without waiting for it to finish.
    pub fn close(self) {
        let Self { outgoing, task } = self;
        drop(outgoing);

        let Some(task) = task else {
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(CLOSE_GRACE).await;
                    task.abort();
                });
            },
            Err(_) => task.abort(),
        }
    }
}
