//! Subscription surface.
//!
//! [`LiveUpdates`] is created once at the application root and owns the
//! runtime. Views never open sockets: they receive a cloneable [`LiveHandle`]
//! and attach to the shared connection through it.
//!
//! ```ignore
//! let live = LiveUpdates::connect(LiveConfig::new("wss://status.example.com/ws"));
//! let handle = live.handle();
//!
//! let subscription = handle
//!     .subscribe(TriggerSet::all(), move || reload_services(api.clone()))
//!     .await?;
//! ```

use std::{future::Future, sync::Arc};

use futures_util::FutureExt;
use statuslive_core::{
    ConnectionState, Environment, HandlerId, InboundMessage, OutboundMessage, ReloadReason,
    StatusIndicator, SubscriberId, TriggerSet,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::{
    config::LiveConfig,
    env::SystemEnv,
    error::LiveError,
    runtime::{Command, ReloadFn, Runtime},
    transport::Transport,
    websocket::WebSocketTransport,
};

/// Capacity of the event broadcast; slow consumers skip older events.
const EVENT_CAPACITY: usize = 256;

/// Observable state of the shared connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Current connection state
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open
    pub retry_count: u32,
    /// Most recent well-formed inbound message
    pub last_message: Option<InboundMessage>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self { state: ConnectionState::Disconnected, retry_count: 0, last_message: None }
    }
}

/// Events published by the runtime, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Connection state or retry count changed
    StateChanged {
        /// New state
        state: ConnectionState,
        /// Retry count at the time of the change
        retry_count: u32,
    },
    /// Well-formed message received
    Message(InboundMessage),
}

/// Reload bookkeeping for one subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freshness {
    /// Wall-clock seconds of the most recent reload. `None` until the first.
    pub last_updated: Option<u64>,
    /// Reloads invoked so far
    pub reloads: u64,
    /// Cause of the most recent reload
    pub last_reason: Option<ReloadReason>,
}

/// Root owner of the shared connection.
///
/// Dropping it tears the runtime down: the socket is closed and pending
/// retries and reloads are cancelled.
pub struct LiveUpdates {
    handle: LiveHandle,
    task: Option<JoinHandle<()>>,
}

impl LiveUpdates {
    /// Start live updates over `transport`, timed by `env`.
    ///
    /// Connects immediately. Must be called within a tokio runtime.
    pub fn start<T: Transport, E: Environment>(config: LiveConfig, transport: T, env: E) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let runtime =
            Runtime::new(config, transport, env, commands_rx, snapshot_tx, events_tx.clone());
        let task = tokio::spawn(runtime.run());

        Self {
            handle: LiveHandle { commands: commands_tx, snapshot: snapshot_rx, events: events_tx },
            task: Some(task),
        }
    }

    /// Start live updates over WebSocket with the system clock.
    pub fn connect(config: LiveConfig) -> Self {
        Self::start(config, WebSocketTransport::new(), SystemEnv::new())
    }

    /// Capability handed to views.
    pub fn handle(&self) -> LiveHandle {
        self.handle.clone()
    }

    /// Tear down and wait for the runtime to finish.
    pub async fn shutdown(mut self) {
        let _ = self.handle.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "live update runtime ended abnormally");
        }
    }
}

impl Drop for LiveUpdates {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.handle.commands.send(Command::Shutdown);
        }
    }
}

/// Cloneable capability for reading connection state and attaching views.
#[derive(Clone)]
pub struct LiveHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    events: broadcast::Sender<LiveEvent>,
}

impl LiveHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// True only while connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Most recent well-formed inbound message.
    pub fn last_message(&self) -> Option<InboundMessage> {
        self.snapshot.borrow().last_message.clone()
    }

    /// Reconnect attempts since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.snapshot.borrow().retry_count
    }

    /// Status affordance for the current state.
    pub fn indicator(&self, retry_enabled: bool) -> StatusIndicator {
        let snapshot = self.snapshot.borrow();
        StatusIndicator::new(snapshot.state, snapshot.retry_count, retry_enabled)
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Stream of state changes and messages from now on.
    ///
    /// Never ends while the runtime lives. A consumer that falls behind skips
    /// the events it missed.
    pub fn events(&self) -> impl Stream<Item = LiveEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "event consumer lagged");
                None
            },
        })
    }

    /// Reset the retry count and reconnect now, bypassing backoff.
    pub fn force_reconnect(&self) -> Result<(), LiveError> {
        self.command(Command::ForceReconnect)
    }

    /// Send a message if connected.
    ///
    /// Best effort: while not connected the message is dropped with a log and
    /// no error is returned. Only a shut-down runtime is an error.
    pub fn send_message(&self, message: OutboundMessage) -> Result<(), LiveError> {
        self.command(Command::Send(message))
    }

    /// Register a reload callback for messages in `interest`.
    ///
    /// `reload` is invoked fire-and-forget after each matching trigger message
    /// (debounced), on the fallback schedule, and on manual refresh. Dropping
    /// the returned [`Subscription`] deregisters it.
    pub async fn subscribe<F, Fut>(
        &self,
        interest: TriggerSet,
        reload: F,
    ) -> Result<Subscription, LiveError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let reload: ReloadFn = Arc::new(move || reload().boxed());
        let (reply, response) = oneshot::channel();
        self.command(Command::Subscribe { interest, reload, reply })?;

        let (id, freshness) = response.await.map_err(|_| LiveError::Closed)?;
        Ok(Subscription { id, freshness, commands: self.commands.clone() })
    }

    /// Register a handler that sees every well-formed message.
    ///
    /// Handlers run synchronously on the runtime task and must not block.
    pub async fn on_message<F>(&self, handler: F) -> Result<MessageSubscription, LiveError>
    where
        F: FnMut(&InboundMessage) + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.command(Command::OnMessage { handler: Box::new(handler), reply })?;

        let id = response.await.map_err(|_| LiveError::Closed)?;
        Ok(MessageSubscription { id, commands: self.commands.clone() })
    }

    fn command(&self, command: Command) -> Result<(), LiveError> {
        self.commands.send(command).map_err(|_| LiveError::Closed)
    }
}

/// A view's registration with the trigger policy.
pub struct Subscription {
    id: SubscriberId,
    freshness: watch::Receiver<Freshness>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Policy-assigned ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wall-clock seconds of the most recent reload.
    pub fn last_updated(&self) -> Option<u64> {
        self.freshness.borrow().last_updated
    }

    /// Receiver that observes every reload.
    pub fn freshness(&self) -> watch::Receiver<Freshness> {
        self.freshness.clone()
    }

    /// Manual refresh: reload now, and reconnect if not connected.
    pub fn refresh(&self) -> Result<(), LiveError> {
        self.commands.send(Command::Refresh(self.id)).map_err(|_| LiveError::Closed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

/// A registered message handler. Dropping it removes the handler.
pub struct MessageSubscription {
    id: HandlerId,
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::RemoveHandler(self.id));
    }
}
