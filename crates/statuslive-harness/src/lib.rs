//! Deterministic test harness for status page live updates.
//!
//! In-memory implementations of the client's seams, meant to be combined with
//! tokio's paused clock (`#[tokio::test(start_paused = true)]`):
//!
//! - [`ScriptedTransport`]: a transport whose sockets are opened, fed frames,
//!   and closed by the test
//! - [`ReloadProbe`]: a reload callback that counts its invocations
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold for every observable
//! [`Snapshot`](statuslive_client::Snapshot), whatever sequence of events
//! produced it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod probe;
pub mod scripted;

pub use invariants::{Violation, check_snapshot};
pub use probe::ReloadProbe;
pub use scripted::ScriptedTransport;

/// Let spawned tasks and channel deliveries run to quiescence.
///
/// Yields without idling the runtime, so the paused clock never auto-advances
/// while settling.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
