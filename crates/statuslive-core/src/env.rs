//! Environment abstraction for deterministic testing.
//!
//! Decouples live-update logic from system resources (monotonic time, wall
//! clock, sleeping). Production uses tokio time and the system clock; tests
//! pause tokio's clock and advance it explicitly, so backoff and debounce
//! timing is simulated instead of waited for.

use std::{
    fmt::Debug,
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

/// A point on a monotonic clock.
///
/// Blanket-implemented for any instant type that supports the arithmetic the
/// state machines need, e.g. `std::time::Instant` and `tokio::time::Instant`.
pub trait Timepoint:
    Copy + Ord + Send + Sync + Debug + Add<Duration, Output = Self> + Sub<Output = Duration>
{
    /// Time remaining until `deadline`, zero if it already passed.
    fn until(self, deadline: Self) -> Duration {
        if deadline > self { deadline - self } else { Duration::ZERO }
    }
}

impl<T> Timepoint for T where
    T: Copy + Ord + Send + Sync + Debug + Add<Duration, Output = T> + Sub<Output = Duration>
{
}

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock_secs()` is only used for display, never for scheduling
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production uses `tokio::time::Instant` so the runtime's timers and the
    /// state machines agree on a single clock, including when it is paused.
    type Instant: Timepoint;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not state machine logic).
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Seconds since the Unix epoch, for "last updated" displays.
    fn wall_clock_secs(&self) -> u64;
}
