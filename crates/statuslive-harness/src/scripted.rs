//! Scripted in-memory transport.
//!
//! Every `open` records a socket and returns immediately; nothing happens on
//! it until the test drives it. Clones share the same record, so a test keeps
//! one clone and hands another to the runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use statuslive_client::{SocketEvent, SocketEvents, SocketHandle, Transport, TransportError};
use statuslive_core::SocketId;
use tokio::sync::mpsc::{self, error::TryRecvError};

#[derive(Debug)]
struct ScriptedSocket {
    id: SocketId,
    endpoint: String,
    events: SocketEvents,
    outgoing: mpsc::UnboundedReceiver<String>,
    sent: Vec<String>,
    closed: bool,
}

impl ScriptedSocket {
    /// Move queued outgoing frames into `sent` and notice a dropped handle.
    fn drain(&mut self) {
        loop {
            match self.outgoing.try_recv() {
                Ok(text) => self.sent.push(text),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                },
            }
        }
    }

    fn emit(&self, event: SocketEvent) {
        if self.events.send((self.id, event)).is_err() {
            tracing::debug!(socket = %self.id, "runtime gone, scripted event dropped");
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    sockets: Vec<ScriptedSocket>,
    reject_next: usize,
}

/// Transport driven step by step by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    /// Create a transport with no sockets.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the record from the next assertion
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_socket<R>(&self, socket: SocketId, f: impl FnOnce(&mut ScriptedSocket) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.sockets.iter_mut().find(|s| s.id == socket).map(f)
    }

    /// Make the next `count` opens fail synchronously.
    pub fn reject_next_opens(&self, count: usize) {
        self.lock().reject_next = count;
    }

    /// Sockets opened so far, in order.
    pub fn opened(&self) -> Vec<SocketId> {
        self.lock().sockets.iter().map(|s| s.id).collect()
    }

    /// Number of sockets opened so far.
    pub fn open_count(&self) -> usize {
        self.lock().sockets.len()
    }

    /// Most recently opened socket.
    pub fn latest(&self) -> Option<SocketId> {
        self.lock().sockets.last().map(|s| s.id)
    }

    /// Endpoint `socket` was opened to.
    pub fn endpoint(&self, socket: SocketId) -> Option<String> {
        self.with_socket(socket, |s| s.endpoint.clone())
    }

    /// Complete the handshake.
    pub fn accept(&self, socket: SocketId) {
        self.with_socket(socket, |s| s.emit(SocketEvent::Opened));
    }

    /// Deliver a text frame.
    pub fn push_frame(&self, socket: SocketId, text: impl Into<String>) {
        let text = text.into();
        self.with_socket(socket, |s| s.emit(SocketEvent::Frame(text)));
    }

    /// Fail the handshake: `Error` followed by `Closed`.
    pub fn fail(&self, socket: SocketId) {
        self.with_socket(socket, |s| {
            s.emit(SocketEvent::Error("connection refused".into()));
            s.emit(SocketEvent::Closed);
        });
    }

    /// Close from the server side.
    pub fn drop_connection(&self, socket: SocketId) {
        self.with_socket(socket, |s| s.emit(SocketEvent::Closed));
    }

    /// Report an error with no close after it.
    pub fn error_only(&self, socket: SocketId) {
        self.with_socket(socket, |s| s.emit(SocketEvent::Error("stalled".into())));
    }

    /// Frames the runtime sent on `socket`.
    pub fn sent(&self, socket: SocketId) -> Vec<String> {
        self.with_socket(socket, |s| {
            s.drain();
            s.sent.clone()
        })
        .unwrap_or_default()
    }

    /// True once the runtime dropped or closed its handle to `socket`.
    pub fn is_closed(&self, socket: SocketId) -> bool {
        self.with_socket(socket, |s| {
            s.drain();
            s.closed
        })
        .unwrap_or(false)
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        endpoint: &str,
        socket: SocketId,
        events: SocketEvents,
    ) -> Result<SocketHandle, TransportError> {
        let mut inner = self.lock();

        if inner.reject_next > 0 {
            inner.reject_next -= 1;
            return Err(TransportError::Rejected(format!("scripted rejection of {socket}")));
        }

        let (outgoing_tx, outgoing) = mpsc::unbounded_channel();
        inner.sockets.push(ScriptedSocket {
            id: socket,
            endpoint: endpoint.to_owned(),
            events,
            outgoing,
            sent: Vec::new(),
            closed: false,
        });

        Ok(SocketHandle::new(outgoing_tx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket_ids(n: usize) -> Vec<SocketId> {
        let now = std::time::Instant::now();
        let mut conn =
            statuslive_core::ConnectionManager::new(now, statuslive_core::ReconnectConfig::default());
        (0..n)
            .filter_map(|_| match conn.connect(now).pop() {
                Some(statuslive_core::ConnectionAction::OpenSocket { socket }) => Some(socket),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn records_opens_and_events() {
        let transport = ScriptedTransport::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let ids = socket_ids(1);

        let handle = transport.open("ws://test/ws", ids[0], events_tx).unwrap();
        assert_eq!(transport.opened(), ids);
        assert_eq!(transport.endpoint(ids[0]).as_deref(), Some("ws://test/ws"));

        transport.accept(ids[0]);
        transport.push_frame(ids[0], "hello");
        assert_eq!(events_rx.recv().await, Some((ids[0], SocketEvent::Opened)));
        assert_eq!(events_rx.recv().await, Some((ids[0], SocketEvent::Frame("hello".into()))));

        assert!(handle.send("out".into()));
        assert_eq!(transport.sent(ids[0]), vec!["out".to_owned()]);

        assert!(!transport.is_closed(ids[0]));
        handle.close();
        assert!(transport.is_closed(ids[0]));
    }

    #[test]
    fn rejects_scripted_opens() {
        let transport = ScriptedTransport::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let ids = socket_ids(2);

        transport.reject_next_opens(1);

        assert!(transport.open("ws://test/ws", ids[0], events_tx.clone()).is_err());
        assert!(transport.open("ws://test/ws", ids[1], events_tx).is_ok());
        assert_eq!(transport.opened(), vec![ids[1]]);
    }
}
