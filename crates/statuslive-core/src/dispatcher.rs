//! Message dispatcher.
//!
//! Parses inbound frames, remembers the most recent message, and broadcasts
//! every message to all registered handlers. The dispatcher does not filter:
//! deciding which kinds matter is each handler's business.
//!
//! Handlers run synchronously, in registration order, inside the frame
//! callback. Each invocation is isolated so a panicking handler is logged and
//! the remaining handlers are still notified.

use std::panic::{self, AssertUnwindSafe};

use crate::message::InboundMessage;

/// Callback invoked for every parsed inbound message.
pub type MessageHandler = Box<dyn FnMut(&InboundMessage) + Send>;

/// Identifies a registered [`MessageHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

/// Frame parser and fan-out point.
#[derive(Default)]
pub struct Dispatcher {
    /// Most recent well-formed message. `None` until one arrives.
    last_message: Option<InboundMessage>,
    /// Handlers in registration order
    handlers: Vec<(HandlerId, MessageHandler)>,
    /// Next handler ID to allocate
    next_id: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("last_message", &self.last_message)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no handlers and no last message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it sees every message dispatched from now on.
    pub fn register(&mut self, handler: MessageHandler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Most recent well-formed message. `None` until one arrives.
    pub fn last_message(&self) -> Option<&InboundMessage> {
        self.last_message.as_ref()
    }

    /// Handle one raw text frame.
    ///
    /// Malformed frames are logged and discarded without touching any state.
    /// Well-formed frames replace the last message and are handed to every
    /// handler. Returns the parsed message, if any.
    pub fn dispatch(&mut self, frame: &str) -> Option<&InboundMessage> {
        let message = match InboundMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, frame_len = frame.len(), "dropping malformed frame");
                return None;
            },
        };

        tracing::debug!(kind = %message.kind, "message received");

        for (id, handler) in &mut self.handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&message)));
            if outcome.is_err() {
                tracing::warn!(handler = ?id, kind = %message.kind, "message handler panicked");
            }
        }

        self.last_message = Some(message);
        self.last_message.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting_handler(count: &Arc<AtomicUsize>) -> MessageHandler {
        let count = Arc::clone(count);
        Box::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn stores_last_message() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.last_message().is_none());

        dispatcher.dispatch(r#"{"type":"status_update","data":1}"#);
        dispatcher.dispatch(r#"{"type":"incident_created","data":2}"#);

        assert_eq!(dispatcher.last_message().map(|m| m.kind.as_str()), Some("incident_created"));
    }

    #[test]
    fn malformed_frame_changes_nothing() {
        let mut dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        dispatcher.register(counting_handler(&count));

        dispatcher.dispatch(r#"{"type":"status_update"}"#);
        assert!(dispatcher.dispatch("{ definitely not json").is_none());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.last_message().map(|m| m.kind.as_str()), Some("status_update"));
    }

    #[test]
    fn handlers_run_in_registration_order_without_filtering() {
        let mut dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            dispatcher.register(Box::new(move |msg| {
                seen.lock().unwrap().push(format!("{name}:{}", msg.kind));
            }));
        }

        dispatcher.dispatch(r#"{"type":"not_a_trigger"}"#);

        assert_eq!(*seen.lock().unwrap(), vec![
            "first:not_a_trigger",
            "second:not_a_trigger",
            "third:not_a_trigger"
        ]);
    }

    #[test]
    fn panicking_handler_does_not_starve_others() {
        let mut dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        dispatcher.register(Box::new(|_| panic!("handler failure")));
        dispatcher.register(counting_handler(&count));

        let message = dispatcher.dispatch(r#"{"type":"status_update"}"#);

        assert!(message.is_some());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_stops_delivery() {
        let mut dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = dispatcher.register(counting_handler(&count));

        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));

        dispatcher.dispatch(r#"{"type":"status_update"}"#);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.handler_count(), 0);
    }
}
