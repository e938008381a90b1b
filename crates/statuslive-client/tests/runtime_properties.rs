//! Property-based tests for the live-update runtime.
//!
//! Applies arbitrary socket and time sequences through the scripted transport
//! and checks the snapshot invariants after every step.

use std::time::Duration;

use proptest::prelude::*;
use statuslive_client::{LiveConfig, LiveUpdates, SystemEnv};
use statuslive_core::{ConnectionState, ReconnectConfig, TriggerSet};
use statuslive_harness::{ReloadProbe, ScriptedTransport, check_snapshot, settle};

/// Generate random operations against the runtime.
#[derive(Debug, Clone)]
enum Op {
    Accept,
    Fail,
    Drop,
    ErrorOnly,
    Frame(&'static str),
    Advance(u64),
    ForceReconnect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Accept),
        2 => Just(Op::Fail),
        2 => Just(Op::Drop),
        1 => Just(Op::ErrorOnly),
        2 => prop::sample::select(vec![
            r#"{"type":"status_update"}"#,
            r#"{"type":"incident_created","data":{"id":"i1"}}"#,
            r#"{"type":"presence"}"#,
            "garbage",
        ])
        .prop_map(Op::Frame),
        3 => (1u64..45_000).prop_map(Op::Advance),
        1 => Just(Op::ForceReconnect),
    ]
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_snapshot_invariants_hold(
        max_attempts in 0u32..5,
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let runtime = paused_runtime();
        let result: Result<(), TestCaseError> = runtime.block_on(async {
            let transport = ScriptedTransport::new();
            let config = LiveConfig::new("ws://status.test/ws")
                .with_reconnect(ReconnectConfig { max_attempts, ..ReconnectConfig::default() });
            let live = LiveUpdates::start(config, transport.clone(), SystemEnv::new());
            let handle = live.handle();
            let probe = ReloadProbe::new();
            let _subscription = handle.subscribe(TriggerSet::all(), probe.callback()).await.unwrap();
            settle().await;

            for op in ops {
                let socket = transport.latest();
                match (op, socket) {
                    (Op::Accept, Some(socket)) => transport.accept(socket),
                    (Op::Fail, Some(socket)) => transport.fail(socket),
                    (Op::Drop, Some(socket)) => transport.drop_connection(socket),
                    (Op::ErrorOnly, Some(socket)) => transport.error_only(socket),
                    (Op::Frame(text), Some(socket)) => transport.push_frame(socket, text),
                    (Op::Advance(ms), _) => tokio::time::advance(Duration::from_millis(ms)).await,
                    (Op::ForceReconnect, _) => handle.force_reconnect().unwrap(),
                    (_, None) => {},
                }
                settle().await;

                let snapshot = handle.watch().borrow().clone();
                prop_assert_eq!(check_snapshot(&snapshot, max_attempts), Ok(()));

                // At most one live socket at any time
                let open = transport
                    .opened()
                    .into_iter()
                    .filter(|s| !transport.is_closed(*s))
                    .count();
                prop_assert!(open <= 1);
                if snapshot.state == ConnectionState::Connected {
                    prop_assert_eq!(open, 1);
                }
            }

            live.shutdown().await;
            Ok(())
        });
        result?;
    }
}
