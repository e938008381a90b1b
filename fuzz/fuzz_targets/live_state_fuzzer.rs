//! Fuzz target for the connection manager and update trigger together
//!
//! Drives both state machines the way the runtime does, with arbitrary
//! socket events, messages, subscription changes, and time steps.
//!
//! # Invariants
//!
//! - Retry count never exceeds the configured limit
//! - Connected implies a zero retry count and an owned socket
//! - Connecting implies an owned socket
//! - At most one socket is open at any time
//! - Events for sockets other than the current one change nothing
//! - Every reload targets a live subscriber
//! - The next policy deadline always lies in the future

#![no_main]

use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use statuslive_core::{
    ConnectionAction, ConnectionManager, ConnectionState, InboundMessage, PolicyConfig,
    ReconnectConfig, SocketId, SubscriberId, TriggerAction, TriggerKind, TriggerSet, UpdateTrigger,
};

#[derive(Debug, Clone, Arbitrary)]
enum LiveOp {
    Open { stale: bool },
    Error { stale: bool },
    Close { stale: bool },
    ForceReconnect,
    Message { kind: u8 },
    Subscribe { interest: u8 },
    Unsubscribe { index: u8 },
    Refresh { index: u8 },
    Advance { millis: u16 },
    AdvanceLong { seconds: u16 },
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    max_attempts: u8,
    auto_reconnect: bool,
    ops: Vec<LiveOp>,
}

fuzz_target!(|scenario: Scenario| {
    let max_attempts = u32::from(scenario.max_attempts % 8);
    let config = ReconnectConfig {
        max_attempts,
        auto_reconnect: scenario.auto_reconnect,
        ..ReconnectConfig::default()
    };

    let mut now = Instant::now();
    let mut manager = ConnectionManager::new(now, config);
    let mut trigger = UpdateTrigger::new(PolicyConfig::default());
    let mut open: BTreeSet<SocketId> = BTreeSet::new();
    let mut issued: Vec<SocketId> = Vec::new();
    let mut subscribers: Vec<SubscriberId> = Vec::new();

    apply(&mut open, &mut issued, manager.connect(now));

    for op in scenario.ops {
        match op {
            LiveOp::Open { stale } => {
                if let Some(socket) = target(&manager, &issued, stale) {
                    let before = manager.state();
                    manager.handle_open(socket, now);
                    if stale {
                        assert_eq!(manager.state(), before);
                    }
                }
            },
            LiveOp::Error { stale } => {
                if let Some(socket) = target(&manager, &issued, stale) {
                    let before = manager.state();
                    manager.handle_error(socket);
                    if stale {
                        assert_eq!(manager.state(), before);
                    }
                }
            },
            LiveOp::Close { stale } => {
                if let Some(socket) = target(&manager, &issued, stale) {
                    let before = (manager.state(), manager.retry());
                    manager.handle_close(socket, now);
                    if stale {
                        assert_eq!((manager.state(), manager.retry()), before);
                    } else {
                        open.remove(&socket);
                    }
                }
            },
            LiveOp::ForceReconnect => {
                apply(&mut open, &mut issued, manager.force_reconnect(now));
                assert_eq!(manager.retry().attempt, 0);
                assert_eq!(manager.state(), ConnectionState::Connecting);
            },
            LiveOp::Message { kind } => {
                let kinds = TriggerKind::ALL;
                let wire = kinds.get(usize::from(kind)).map_or("presence", |k| k.as_str());
                let message = InboundMessage::new(wire, serde_json::Value::Null);
                trigger.observe(&message, now);
            },
            LiveOp::Subscribe { interest } => {
                let interest: TriggerSet = TriggerKind::ALL
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| interest & (1 << bit) != 0)
                    .map(|(_, kind)| *kind)
                    .collect();
                subscribers.push(trigger.subscribe(interest, now));
            },
            LiveOp::Unsubscribe { index } => {
                if !subscribers.is_empty() {
                    let id = subscribers.remove(usize::from(index) % subscribers.len());
                    trigger.unsubscribe(id);
                }
            },
            LiveOp::Refresh { index } => {
                if let Some(id) = pick(&subscribers, index) {
                    assert!(trigger.request_reload(id, now).is_some());
                }
            },
            LiveOp::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis));
                run_timers(&mut manager, &mut trigger, &mut open, &mut issued, &subscribers, now);
            },
            LiveOp::AdvanceLong { seconds } => {
                now += Duration::from_secs(u64::from(seconds % 600));
                run_timers(&mut manager, &mut trigger, &mut open, &mut issued, &subscribers, now);
            },
        }

        check(&manager, &open, max_attempts);
        assert_eq!(trigger.subscriber_count(), subscribers.len());
    }
});

fn run_timers(
    manager: &mut ConnectionManager<Instant>,
    trigger: &mut UpdateTrigger<Instant>,
    open: &mut BTreeSet<SocketId>,
    issued: &mut Vec<SocketId>,
    subscribers: &[SubscriberId],
    now: Instant,
) {
    apply(open, issued, manager.tick(now));

    for action in trigger.tick(now) {
        let TriggerAction::Reload { subscriber, .. } = action;
        assert!(subscribers.contains(&subscriber));
    }

    if let Some(deadline) = trigger.next_deadline() {
        assert!(deadline > now);
    }
}

fn apply(
    open: &mut BTreeSet<SocketId>,
    issued: &mut Vec<SocketId>,
    actions: Vec<ConnectionAction>,
) {
    for action in actions {
        match action {
            ConnectionAction::OpenSocket { socket } => {
                assert!(!issued.contains(&socket), "{socket} reused");
                issued.push(socket);
                assert!(open.insert(socket));
            },
            ConnectionAction::CloseSocket { socket } => {
                open.remove(&socket);
            },
        }
    }
}

/// Current socket, or for `stale` any earlier socket the manager handed out.
fn target(
    manager: &ConnectionManager<Instant>,
    issued: &[SocketId],
    stale: bool,
) -> Option<SocketId> {
    if stale {
        // IDs are never reused, so anything other than the current one is stale
        return issued.iter().rev().copied().find(|s| manager.current_socket() != Some(*s));
    }
    manager.current_socket()
}

fn pick(subscribers: &[SubscriberId], index: u8) -> Option<SubscriberId> {
    if subscribers.is_empty() {
        return None;
    }
    Some(subscribers[usize::from(index) % subscribers.len()])
}

fn check(manager: &ConnectionManager<Instant>, open: &BTreeSet<SocketId>, max_attempts: u32) {
    let retry = manager.retry();
    assert!(retry.attempt <= max_attempts, "retry count {} above {max_attempts}", retry.attempt);
    assert!(open.len() <= 1, "{} sockets open", open.len());

    match manager.state() {
        ConnectionState::Connected => {
            assert_eq!(retry.attempt, 0);
            assert!(manager.current_socket().is_some());
        },
        ConnectionState::Connecting => assert!(manager.current_socket().is_some()),
        ConnectionState::Disconnected | ConnectionState::Error => {},
    }

    if let Some(socket) = manager.current_socket() {
        assert!(open.contains(&socket));
    }
}
