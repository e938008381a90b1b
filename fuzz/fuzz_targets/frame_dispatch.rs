//! Fuzz target for inbound frame handling
//!
//! Arbitrary text frames go through the dispatcher and the update trigger.
//!
//! # Invariants
//!
//! - Parsing never panics
//! - A rejected frame leaves the last message untouched
//! - An accepted frame becomes the last message and reaches every handler
//! - Only trigger kinds schedule reloads, one per interested subscriber

#![no_main]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use statuslive_core::{
    Dispatcher, InboundMessage, PolicyConfig, TriggerKind, TriggerSet, UpdateTrigger,
};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    let seen = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = Dispatcher::new();
    let counter = Arc::clone(&seen);
    dispatcher.register(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let start = Instant::now();
    let mut trigger = UpdateTrigger::new(PolicyConfig::default());
    trigger.subscribe(TriggerSet::all(), start);
    trigger.subscribe(TriggerSet::empty(), start);

    let previous = InboundMessage::new("status_update", Value::Null);
    dispatcher.dispatch(r#"{"type":"status_update"}"#);
    assert_eq!(dispatcher.last_message(), Some(&previous));
    let baseline = seen.load(Ordering::SeqCst);

    let parsed = InboundMessage::parse(frame).ok();
    let message = dispatcher.dispatch(frame).cloned();
    assert_eq!(message, parsed);

    match message {
        None => {
            assert_eq!(dispatcher.last_message(), Some(&previous));
            assert_eq!(seen.load(Ordering::SeqCst), baseline);
        },
        Some(message) => {
            assert_eq!(dispatcher.last_message(), Some(&message));
            assert_eq!(seen.load(Ordering::SeqCst), baseline + 1);

            let scheduled = trigger.observe(&message, start);
            let expected = usize::from(TriggerKind::from_wire(&message.kind).is_some());
            assert_eq!(scheduled, expected);

            // Nothing fires before the debounce elapses
            assert!(trigger.tick(start + Duration::from_millis(99)).is_empty());
            assert_eq!(trigger.tick(start + Duration::from_millis(100)).len(), expected);
        },
    }
});
