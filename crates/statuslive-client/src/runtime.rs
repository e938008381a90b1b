//! Runtime task.
//!
//! Owns every state machine and the socket. Loops over three inputs, one at a
//! time: commands from handles, socket events from the transport, and the
//! earliest deadline of the connection manager or trigger policy. After each
//! input the observable state is republished.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use statuslive_core::{
    ConnectionAction, ConnectionManager, ConnectionState, Dispatcher, Environment, HandlerId,
    MessageHandler, OutboundMessage, ReloadReason, SocketId, SubscriberId, Timepoint,
    TriggerAction, TriggerSet, UpdateTrigger,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{
    config::LiveConfig,
    handle::{Freshness, LiveEvent, Snapshot},
    transport::{SocketEvent, SocketHandle, Transport},
};

/// View-supplied reload callback. Invoked fire-and-forget.
pub(crate) type ReloadFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Requests from handles to the runtime.
pub(crate) enum Command {
    ForceReconnect,
    Send(OutboundMessage),
    Subscribe {
        interest: TriggerSet,
        reload: ReloadFn,
        reply: oneshot::Sender<(SubscriberId, watch::Receiver<Freshness>)>,
    },
    Unsubscribe(SubscriberId),
    Refresh(SubscriberId),
    OnMessage {
        handler: MessageHandler,
        reply: oneshot::Sender<HandlerId>,
    },
    RemoveHandler(HandlerId),
    Shutdown,
}

struct SubscriberEntry {
    reload: ReloadFn,
    freshness: watch::Sender<Freshness>,
}

pub(crate) struct Runtime<E: Environment, T: Transport> {
    env: E,
    transport: T,
    endpoint: String,
    debug: bool,

    connection: ConnectionManager<E::Instant>,
    dispatcher: Dispatcher,
    policy: UpdateTrigger<E::Instant>,

    socket: Option<(SocketId, SocketHandle)>,
    subscribers: HashMap<SubscriberId, SubscriberEntry>,

    commands: mpsc::UnboundedReceiver<Command>,
    socket_events_tx: mpsc::UnboundedSender<(SocketId, SocketEvent)>,
    socket_events: mpsc::UnboundedReceiver<(SocketId, SocketEvent)>,

    snapshot: watch::Sender<Snapshot>,
    events: broadcast::Sender<LiveEvent>,
    /// State and retry count last announced as `LiveEvent::StateChanged`
    announced: (ConnectionState, u32),
}

impl<E: Environment, T: Transport> Runtime<E, T> {
    pub(crate) fn new(
        config: LiveConfig,
        transport: T,
        env: E,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot: watch::Sender<Snapshot>,
        events: broadcast::Sender<LiveEvent>,
    ) -> Self {
        let now = env.now();
        let (socket_events_tx, socket_events) = mpsc::unbounded_channel();

        Self {
            connection: ConnectionManager::new(now, config.reconnect),
            dispatcher: Dispatcher::new(),
            policy: UpdateTrigger::new(config.policy),
            env,
            transport,
            endpoint: config.endpoint,
            debug: config.debug,
            socket: None,
            subscribers: HashMap::new(),
            commands,
            socket_events_tx,
            socket_events,
            snapshot,
            events,
            announced: (ConnectionState::Disconnected, 0),
        }
    }

    /// Connect, then serve until shutdown.
    pub(crate) async fn run(mut self) {
        tracing::info!(endpoint = %self.endpoint, "live updates starting");

        let actions = self.connection.connect(self.env.now());
        self.execute(actions);
        self.publish();

        loop {
            let deadline = self.next_deadline();
            let delay = deadline.map_or(Duration::ZERO, |at| self.env.now().until(at));

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some((socket, event)) = self.socket_events.recv() => {
                    self.handle_socket_event(socket, event);
                },
                () = self.env.sleep(delay), if deadline.is_some() => self.handle_timers(),
            }

            self.publish();
        }

        self.teardown();
    }

    fn next_deadline(&self) -> Option<E::Instant> {
        match (self.connection.next_deadline(), self.policy.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::OpenSocket { socket } => {
                    match self.transport.open(&self.endpoint, socket, self.socket_events_tx.clone())
                    {
                        Ok(handle) => self.socket = Some((socket, handle)),
                        Err(e) => {
                            tracing::warn!(%socket, error = %e, "socket construction failed");
                            self.connection.handle_open_failed(socket);
                        },
                    }
                },
                ConnectionAction::CloseSocket { socket } => {
                    if let Some((_, handle)) = self.socket.take_if(|(id, _)| *id == socket) {
                        tracing::debug!(%socket, "closing socket");
                        handle.close();
                    }
                },
            }
        }
    }

    fn handle_socket_event(&mut self, socket: SocketId, event: SocketEvent) {
        if !self.connection.is_current(socket) {
            tracing::debug!(%socket, ?event, "ignoring event from stale socket");
            return;
        }

        let now = self.env.now();
        match event {
            SocketEvent::Opened => self.connection.handle_open(socket, now),
            SocketEvent::Frame(text) => self.handle_frame(&text, now),
            SocketEvent::Error(reason) => {
                tracing::warn!(%socket, %reason, "socket error");
                self.connection.handle_error(socket);
            },
            SocketEvent::Closed => {
                // Already closed; dropping the handle is all that is left
                let _ = self.socket.take_if(|(id, _)| *id == socket);
                self.connection.handle_close(socket, now);
            },
        }
    }

    fn handle_frame(&mut self, text: &str, now: E::Instant) {
        if self.debug {
            tracing::info!(frame = %text, "frame received");
        }

        let Some(message) = self.dispatcher.dispatch(text).cloned() else {
            return;
        };

        self.policy.observe(&message, now);
        let _ = self.events.send(LiveEvent::Message(message));
    }

    fn handle_timers(&mut self) {
        let now = self.env.now();

        let actions = self.connection.tick(now);
        self.execute(actions);

        for action in self.policy.tick(now) {
            self.reload(action);
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.env.now();

        match command {
            Command::ForceReconnect => {
                tracing::info!("forced reconnect");
                let actions = self.connection.force_reconnect(now);
                self.execute(actions);
            },
            Command::Send(message) => self.send(&message),
            Command::Subscribe { interest, reload, reply } => {
                let id = self.policy.subscribe(interest, now);
                let (freshness, receiver) = watch::channel(Freshness::default());
                self.subscribers.insert(id, SubscriberEntry { reload, freshness });

                tracing::debug!(subscriber = %id, ?interest, "view subscribed");
                if reply.send((id, receiver)).is_err() {
                    // Caller went away before the reply arrived
                    self.unsubscribe(id);
                }
            },
            Command::Unsubscribe(id) => self.unsubscribe(id),
            Command::Refresh(id) => {
                if let Some(action) = self.policy.request_reload(id, now) {
                    self.reload(action);
                }

                if !self.connection.state().is_connected() {
                    let actions = self.connection.force_reconnect(now);
                    self.execute(actions);
                }
            },
            Command::OnMessage { handler, reply } => {
                let id = self.dispatcher.register(handler);
                if reply.send(id).is_err() {
                    self.dispatcher.unregister(id);
                }
            },
            Command::RemoveHandler(id) => {
                self.dispatcher.unregister(id);
            },
            // Handled by the run loop
            Command::Shutdown => {},
        }
    }

    fn send(&self, message: &OutboundMessage) {
        let socket = match &self.socket {
            Some((_, socket)) if self.connection.state().is_connected() => socket,
            _ => {
                tracing::debug!(
                    kind = %message.kind,
                    state = %self.connection.state(),
                    "dropping send while not connected"
                );
                return;
            },
        };

        let text = match message.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unencodable message");
                return;
            },
        };

        if self.debug {
            tracing::info!(frame = %text, "sending frame");
        }

        if !socket.send(text) {
            tracing::debug!(kind = %message.kind, "dropping send, socket task gone");
        }
    }

    fn unsubscribe(&mut self, id: SubscriberId) {
        self.policy.unsubscribe(id);
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "view unsubscribed");
        }
    }

    fn reload(&mut self, action: TriggerAction) {
        let TriggerAction::Reload { subscriber, reason } = action;
        let Some(entry) = self.subscribers.get(&subscriber) else {
            return;
        };

        match reason {
            ReloadReason::Trigger(kind) => {
                tracing::debug!(%subscriber, %kind, "reloading after live update");
            },
            ReloadReason::Fallback => tracing::info!(%subscriber, "fallback refresh"),
            ReloadReason::Manual => tracing::debug!(%subscriber, "manual refresh"),
        }

        let wall_clock = self.env.wall_clock_secs();
        entry.freshness.send_modify(|freshness| {
            freshness.last_updated = Some(wall_clock);
            freshness.reloads += 1;
            freshness.last_reason = Some(reason);
        });

        // Fire and forget: a slow fetch never blocks dispatch
        tokio::spawn((entry.reload)());
    }

    fn publish(&mut self) {
        let current = Snapshot {
            state: self.connection.state(),
            retry_count: self.connection.retry().attempt,
            last_message: self.dispatcher.last_message().cloned(),
        };

        let announced = (current.state, current.retry_count);
        if announced != self.announced {
            tracing::info!(
                state = %current.state,
                retry_count = current.retry_count,
                "connection state changed"
            );
            self.announced = announced;
            let _ = self.events.send(LiveEvent::StateChanged {
                state: current.state,
                retry_count: current.retry_count,
            });
        }

        self.snapshot.send_if_modified(|snapshot| {
            if *snapshot == current {
                false
            } else {
                *snapshot = current;
                true
            }
        });
    }

    fn teardown(&mut self) {
        let actions = self.connection.teardown();
        self.execute(actions);
        self.subscribers.clear();
        self.publish();

        tracing::info!("live updates stopped");
    }
}
