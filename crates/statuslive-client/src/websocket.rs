//! WebSocket transport over tokio-tungstenite.
//!
//! Each socket runs on its own task bridging the WebSocket stream to the
//! runtime's event channel. The endpoint is validated synchronously so a
//! malformed URL fails construction; everything after that, including a
//! failed handshake, is reported as events.

use futures_util::{SinkExt, StreamExt};
use statuslive_core::SocketId;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::{
    error::TransportError,
    transport::{SocketEvent, SocketEvents, SocketHandle, Transport},
};

/// Production transport.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport, selecting the ring TLS provider for `wss`.
    pub fn new() -> Self {
        // Fails only if a provider is already installed, which is fine
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        endpoint: &str,
        socket: SocketId,
        events: SocketEvents,
    ) -> Result<SocketHandle, TransportError> {
        let url = parse_endpoint(endpoint)?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_socket(url, socket, events, outgoing_rx));

        Ok(SocketHandle::new(outgoing_tx, Some(task.abort_handle())))
    }
}

/// Validate a push endpoint.
///
/// # Errors
///
/// - `TransportError::InvalidEndpoint` if `endpoint` is not a URL
/// - `TransportError::UnsupportedScheme` if the scheme is not `ws` or `wss`
pub fn parse_endpoint(endpoint: &str) -> Result<Url, TransportError> {
    let url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::UnsupportedScheme(other.to_owned())),
    }
}

/// Bridge one WebSocket to the runtime until either side goes away.
async fn run_socket(
    url: Url,
    socket: SocketId,
    events: SocketEvents,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let handshake = tokio::select! {
        result = connect_async(url.as_str()) => result,
        () = closed(&mut outgoing) => {
            tracing::debug!(%socket, "socket closed during handshake");
            let _ = events.send((socket, SocketEvent::Closed));
            return;
        },
    };

    let stream = match handshake {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(%socket, %url, error = %e, "websocket handshake failed");
            let _ = events.send((socket, SocketEvent::Error(e.to_string())));
            let _ = events.send((socket, SocketEvent::Closed));
            return;
        },
    };

    tracing::debug!(%socket, %url, "websocket open");
    if events.send((socket, SocketEvent::Opened)).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = SocketEvent::Frame(text.as_str().to_owned());
                    if events.send((socket, frame)).is_err() {
                        break;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(%socket, ?frame, "server closed websocket");
                    break;
                },
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    let _ = events.send((socket, SocketEvent::Error(e.to_string())));
                    break;
                },
                None => break,
            },
            text = outgoing.recv() => match text {
                Some(text) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let _ = events.send((socket, SocketEvent::Error(e.to_string())));
                        break;
                    }
                },
                None => {
                    // Handle closed: send a Close frame before letting go
                    if let Err(e) = write.close().await {
                        tracing::debug!(%socket, error = %e, "close handshake failed");
                    }
                    break;
                },
            },
        }
    }

    let _ = events.send((socket, SocketEvent::Closed));
}

/// Resolves once the runtime has dropped its handle.
async fn closed(outgoing: &mut mpsc::UnboundedReceiver<String>) {
    // Nothing is sent before the socket reports Opened
    while outgoing.recv().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{net::TcpListener, time::timeout};

    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        assert!(parse_endpoint("ws://localhost:8000/ws").is_ok());
        assert!(parse_endpoint("wss://status.example.com/ws?token=abc").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        let result = parse_endpoint("https://status.example.com/ws");
        assert_eq!(result, Err(TransportError::UnsupportedScheme("https".into())));
    }

    #[test]
    fn rejects_garbage() {
        let result = parse_endpoint("not a url");
        assert!(matches!(result, Err(TransportError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_construction_without_events() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = WebSocketTransport::new().open("ftp://nope", first_socket(), events_tx);

        assert!(result.is_err());
        assert!(events_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_sends_close_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.next().await
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let socket = first_socket();
        let handle =
            WebSocketTransport::new().open(&format!("ws://{addr}/ws"), socket, events_tx).unwrap();
        assert_eq!(events_rx.recv().await, Some((socket, SocketEvent::Opened)));

        handle.close();

        let received = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(matches!(received, Some(Ok(Message::Close(_)))), "server saw {received:?}");
        assert_eq!(events_rx.recv().await, Some((socket, SocketEvent::Closed)));
    }

    #[tokio::test]
    async fn close_during_handshake_reports_closed_only() {
        // Accepts TCP but never answers the upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(tcp);
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let socket = first_socket();
        let handle =
            WebSocketTransport::new().open(&format!("ws://{addr}/ws"), socket, events_tx).unwrap();

        handle.close();

        let event = timeout(Duration::from_secs(5), events_rx.recv()).await.unwrap();
        assert_eq!(event, Some((socket, SocketEvent::Closed)));
    }

    fn first_socket() -> SocketId {
        let mut conn = statuslive_core::ConnectionManager::new(
            std::time::Instant::now(),
            statuslive_core::ReconnectConfig::default(),
        );
        match conn.connect(std::time::Instant::now()).pop() {
            Some(statuslive_core::ConnectionAction::OpenSocket { socket }) => socket,
            other => panic!("expected OpenSocket, got {other:?}"),
        }
    }
}
