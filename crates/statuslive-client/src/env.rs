//! Production environment.
//!
//! `SystemEnv` runs on tokio's clock rather than `std::time`, so the state
//! machines and the runtime's timers always agree, including under tokio's
//! paused test clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use statuslive_core::Environment;

/// Production environment using tokio time and the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn wall_clock_secs(&self) -> u64 {
        // A clock set before 1970 only affects freshness displays
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
    }
}
