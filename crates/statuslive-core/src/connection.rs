//! Connection manager state machine.
//!
//! Owns the lifecycle of the single push socket: connect, exponential-backoff
//! retry, periodic health check, and teardown. Uses the action pattern:
//! methods take time as input and return actions for the driver to execute.
//! The manager never touches a socket itself, it only decides when one must be
//! opened or closed.
//!
//! # State Machine
//!
//! ```text
//!                connect()            open
//! ┌──────────────┐ ───────> ┌────────────┐ ───────> ┌───────────┐
//! │ Disconnected │          │ Connecting │          │ Connected │
//! └──────────────┘ <─────── └────────────┘          └───────────┘
//!        ↑  │         close         │ error / open failed   │
//!        │  │ retries exhausted     ↓                       │ close
//!        │  └──────────────> ┌───────┐                      │
//!        │                   │ Error │                      │
//!        │                   └───────┘                      │
//!        └──────────────────────────────────────────────────┘
//! ```
//!
//! Close is authoritative for retry scheduling. An error that is never
//! followed by a close leaves the manager in `Error` with no retry in flight;
//! the periodic health check is the recovery path for that case.

use std::{fmt, time::Duration};

use crate::env::Timepoint;

/// Delay before the first reconnect attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Upper bound on the delay between reconnect attempts.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(30_000);

/// Automatic reconnect attempts before settling on [`ConnectionState::Error`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Interval of the proactive reconnection check.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Identifies one socket opened by [`ConnectionManager::connect`].
///
/// Every connect allocates a fresh ID. Events tagged with an ID other than
/// the current socket's belong to a socket that has since been replaced or
/// torn down, and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Actions returned by the connection manager.
///
/// The driver executes these actions:
/// - `OpenSocket`: Construct a socket to the configured endpoint
/// - `CloseSocket`: Close the socket without reporting further events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new socket tagged with this ID
    OpenSocket {
        /// ID to tag the socket's events with
        socket: SocketId,
    },

    /// Close this socket
    CloseSocket {
        /// Socket to close
        socket: SocketId,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket, or the socket closed
    Disconnected,
    /// Socket constructed, waiting for it to open
    Connecting,
    /// Socket open, frames flowing
    Connected,
    /// Socket errored, failed to construct, or retries are exhausted
    Error,
}

impl ConnectionState {
    /// True only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Lowercase wire-style name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconnect configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,
    /// Ceiling on the retry delay
    pub max_delay: Duration,
    /// Automatic retries before giving up
    pub max_attempts: u32,
    /// Whether a close schedules a retry at all
    pub auto_reconnect: bool,
    /// Period of the proactive reconnection check
    pub health_check_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_reconnect: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retrying after `attempt` earlier retries.
    ///
    /// `min(base * 2^attempt, cap)`, saturating to the cap instead of
    /// overflowing for large attempt counts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Retries scheduled since the last successful open or forced reconnect
    pub attempt: u32,
    /// Limit on `attempt`
    pub max_attempts: u32,
}

impl RetryState {
    /// True once no further automatic retry may be scheduled.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Connection manager state machine.
///
/// Pure state machine: no I/O, no timers of its own. Deadlines for the
/// pending retry and the next health check are stored as instants; the driver
/// sleeps until [`next_deadline`](Self::next_deadline) and calls
/// [`tick`](Self::tick).
///
/// Generic over the instant type to support both real time and virtual time
/// for deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I: Timepoint> {
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ReconnectConfig,
    /// Retry counter
    retry: RetryState,
    /// Socket currently owned. `None` if no socket is open or opening.
    socket: Option<SocketId>,
    /// Next socket ID to allocate
    next_socket: u64,
    /// When the scheduled retry fires. `None` if no retry is pending.
    retry_at: Option<I>,
    /// When the next health check runs. `None` after teardown.
    health_check_at: Option<I>,
    /// Owning scope is gone; every callback becomes a no-op
    torn_down: bool,
}

impl<I: Timepoint> ConnectionManager<I> {
    /// Create a manager in [`ConnectionState::Disconnected`].
    ///
    /// The health check clock starts now.
    pub fn new(now: I, config: ReconnectConfig) -> Self {
        let retry = RetryState { attempt: 0, max_attempts: config.max_attempts };
        let health_check_at = Some(now + config.health_check_interval);
        Self {
            state: ConnectionState::Disconnected,
            config,
            retry,
            socket: None,
            next_socket: 1,
            retry_at: None,
            health_check_at,
            torn_down: false,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retry counter.
    pub fn retry(&self) -> RetryState {
        self.retry
    }

    /// Configuration.
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Socket currently owned. `None` if no socket is open or opening.
    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// True if events from `socket` should be processed.
    pub fn is_current(&self, socket: SocketId) -> bool {
        !self.torn_down && self.socket == Some(socket)
    }

    /// When the scheduled retry fires. `None` if no retry is pending.
    pub fn retry_deadline(&self) -> Option<I> {
        self.retry_at
    }

    /// True once [`teardown`](Self::teardown) ran.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        match (self.retry_at, self.health_check_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Open a fresh socket, closing any existing one first.
    ///
    /// Idempotent from the caller's view: repeated calls always end with
    /// exactly one socket in [`ConnectionState::Connecting`]. Cancels a
    /// pending retry, since this call is that retry or supersedes it.
    pub fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.torn_down {
            return vec![];
        }

        let mut actions = Vec::with_capacity(2);
        if let Some(old) = self.socket.take() {
            actions.push(ConnectionAction::CloseSocket { socket: old });
        }

        self.retry_at = None;

        let socket = SocketId(self.next_socket);
        self.next_socket += 1;
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;

        tracing::debug!(%socket, attempt = self.retry.attempt, ?now, "connecting");
        actions.push(ConnectionAction::OpenSocket { socket });
        actions
    }

    /// Reset the retry counter and connect immediately, bypassing backoff.
    ///
    /// Used for user-triggered "retry" actions, including after retries are
    /// exhausted.
    pub fn force_reconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.torn_down {
            return vec![];
        }

        self.retry.attempt = 0;
        self.connect(now)
    }

    /// Socket opened successfully.
    pub fn handle_open(&mut self, socket: SocketId, _now: I) {
        if !self.is_current(socket) {
            return;
        }

        self.state = ConnectionState::Connected;
        self.retry.attempt = 0;
    }

    /// Socket construction failed synchronously.
    ///
    /// No close will follow, so nothing is scheduled. The health check
    /// retries later.
    pub fn handle_open_failed(&mut self, socket: SocketId) {
        if !self.is_current(socket) {
            return;
        }

        self.socket = None;
        self.state = ConnectionState::Error;
    }

    /// Socket reported an error.
    ///
    /// Does not schedule a retry; the close that normally follows does.
    pub fn handle_error(&mut self, socket: SocketId) {
        if !self.is_current(socket) {
            return;
        }

        self.state = ConnectionState::Error;
    }

    /// Socket closed, whatever the cause.
    ///
    /// Schedules a retry after `min(base * 2^attempt, cap)` if auto-reconnect
    /// is on and retries remain, then counts the attempt. Settles on
    /// [`ConnectionState::Error`] once retries are exhausted.
    pub fn handle_close(&mut self, socket: SocketId, now: I) {
        if !self.is_current(socket) {
            return;
        }

        self.socket = None;
        self.state = ConnectionState::Disconnected;

        if !self.config.auto_reconnect {
            return;
        }

        if self.retry.is_exhausted() {
            tracing::warn!(max_attempts = self.retry.max_attempts, "reconnect attempts exhausted");
            self.state = ConnectionState::Error;
            return;
        }

        let delay = self.config.delay_for_attempt(self.retry.attempt);
        self.retry_at = Some(now + delay);
        self.retry.attempt += 1;

        tracing::info!(
            ?delay,
            attempt = self.retry.attempt,
            max_attempts = self.retry.max_attempts,
            "reconnect scheduled"
        );
    }

    /// Process timers: the pending retry and the periodic health check.
    ///
    /// The health check connects when not connected, not already connecting,
    /// and retries remain.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.torn_down {
            return vec![];
        }

        let mut actions = Vec::new();

        if self.retry_at.is_some_and(|at| at <= now) {
            self.retry_at = None;
            actions.extend(self.connect(now));
        }

        if let Some(at) = self.health_check_at
            && at <= now
        {
            self.health_check_at = Some(now + self.config.health_check_interval);

            let idle =
                !matches!(self.state, ConnectionState::Connected | ConnectionState::Connecting);
            if idle && !self.retry.is_exhausted() {
                tracing::debug!(state = %self.state, "health check reconnecting");
                actions.extend(self.connect(now));
            }
        }

        actions
    }

    /// Tear down for good.
    ///
    /// Marks the manager torn down first so late callbacks no-op, cancels the
    /// pending retry and the health check, and closes the socket without
    /// any reconnect logic.
    pub fn teardown(&mut self) -> Vec<ConnectionAction> {
        if self.torn_down {
            return vec![];
        }

        self.torn_down = true;
        self.retry_at = None;
        self.health_check_at = None;
        self.state = ConnectionState::Disconnected;

        match self.socket.take() {
            Some(socket) => vec![ConnectionAction::CloseSocket { socket }],
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn manager(max_attempts: u32) -> (ConnectionManager<Instant>, Instant) {
        let t0 = Instant::now();
        let config = ReconnectConfig { max_attempts, ..ReconnectConfig::default() };
        (ConnectionManager::new(t0, config), t0)
    }

    fn opened_socket(actions: &[ConnectionAction]) -> SocketId {
        match actions.last() {
            Some(ConnectionAction::OpenSocket { socket }) => *socket,
            other => panic!("expected OpenSocket, got {other:?}"),
        }
    }

    #[test]
    fn open_walks_disconnected_connecting_connected() {
        let (mut conn, t0) = manager(5);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let socket = opened_socket(&conn.connect(t0));
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.handle_open(socket, t0);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(conn.state().is_connected());
    }

    #[test]
    fn connect_closes_existing_socket_first() {
        let (mut conn, t0) = manager(5);
        let first = opened_socket(&conn.connect(t0));

        let actions = conn.connect(t0);
        let second = opened_socket(&actions);

        assert_ne!(first, second);
        assert_eq!(actions[0], ConnectionAction::CloseSocket { socket: first });
        assert_eq!(conn.current_socket(), Some(second));
    }

    #[test]
    fn stale_socket_events_are_ignored() {
        let (mut conn, t0) = manager(5);
        let first = opened_socket(&conn.connect(t0));
        let second = opened_socket(&conn.connect(t0));

        conn.handle_close(first, t0);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.retry().attempt, 0);
        assert!(conn.retry_deadline().is_none());

        conn.handle_open(second, t0);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[test]
    fn close_schedules_backoff_and_counts_attempt() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));

        conn.handle_close(socket, t0);

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.retry().attempt, 1);
        assert_eq!(conn.retry_deadline(), Some(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn retry_fires_only_when_due() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_close(socket, t0);

        assert!(conn.tick(t0 + Duration::from_millis(999)).is_empty());

        let actions = conn.tick(t0 + Duration::from_millis(1000));
        assert!(matches!(actions.as_slice(), [ConnectionAction::OpenSocket { .. }]));
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.retry_deadline().is_none());
    }

    #[test]
    fn three_closes_count_one_two_three() {
        let (mut conn, t0) = manager(5);
        let mut now = t0;
        let mut socket = opened_socket(&conn.connect(now));
        let mut observed = Vec::new();

        for _ in 0..3 {
            conn.handle_close(socket, now);
            observed.push(conn.retry().attempt);

            now = conn.retry_deadline().unwrap();
            socket = opened_socket(&conn.tick(now));
        }

        assert_eq!(observed, vec![1, 2, 3]);

        conn.handle_close(socket, now);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn exhausted_retries_settle_on_error() {
        let (mut conn, t0) = manager(2);
        let mut now = t0;
        let mut socket = opened_socket(&conn.connect(now));

        // Initial connection fails, scheduling retry 1
        conn.handle_close(socket, now);
        now = conn.retry_deadline().unwrap();
        socket = opened_socket(&conn.tick(now));

        // Retry 1 fails, scheduling retry 2
        conn.handle_close(socket, now);
        now = conn.retry_deadline().unwrap();
        socket = opened_socket(&conn.tick(now));

        // Retry 2 fails: nothing left
        conn.handle_close(socket, now);
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.retry_deadline().is_none());
        assert!(conn.retry().is_exhausted());

        // Health check does not revive an exhausted manager
        let later = now + Duration::from_secs(600);
        assert!(conn.tick(later).is_empty());
    }

    #[test]
    fn successful_open_resets_attempt() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_close(socket, t0);
        assert_eq!(conn.retry().attempt, 1);

        let now = conn.retry_deadline().unwrap();
        let socket = opened_socket(&conn.tick(now));
        conn.handle_open(socket, now);

        assert_eq!(conn.retry().attempt, 0);
    }

    #[test]
    fn force_reconnect_resets_attempt_and_bypasses_backoff() {
        let (mut conn, t0) = manager(1);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_close(socket, t0);
        let now = conn.retry_deadline().unwrap();
        let socket = opened_socket(&conn.tick(now));
        conn.handle_close(socket, now);
        assert_eq!(conn.state(), ConnectionState::Error);

        let actions = conn.force_reconnect(now);
        assert!(matches!(actions.as_slice(), [ConnectionAction::OpenSocket { .. }]));
        assert_eq!(conn.retry().attempt, 0);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn connect_cancels_pending_retry() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_close(socket, t0);
        assert!(conn.retry_deadline().is_some());

        let _ = conn.force_reconnect(t0);
        assert!(conn.retry_deadline().is_none());
    }

    #[test]
    fn error_without_close_waits_for_health_check() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_open(socket, t0);

        conn.handle_error(socket);
        assert_eq!(conn.state(), ConnectionState::Error);
        assert!(conn.retry_deadline().is_none());

        assert!(conn.tick(t0 + Duration::from_secs(29)).is_empty());

        let actions = conn.tick(t0 + DEFAULT_HEALTH_CHECK_INTERVAL);
        assert_eq!(actions, vec![
            ConnectionAction::CloseSocket { socket },
            ConnectionAction::OpenSocket { socket: opened_socket(&actions) },
        ]);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn health_check_leaves_healthy_connection_alone() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_open(socket, t0);

        assert!(conn.tick(t0 + DEFAULT_HEALTH_CHECK_INTERVAL).is_empty());
        assert_eq!(conn.next_deadline(), Some(t0 + DEFAULT_HEALTH_CHECK_INTERVAL * 2));
    }

    #[test]
    fn health_check_skips_while_connecting() {
        let (mut conn, t0) = manager(5);
        let _ = conn.connect(t0);

        assert!(conn.tick(t0 + DEFAULT_HEALTH_CHECK_INTERVAL).is_empty());
    }

    #[test]
    fn open_failure_is_error_without_retry() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));

        conn.handle_open_failed(socket);

        assert_eq!(conn.state(), ConnectionState::Error);
        assert_eq!(conn.current_socket(), None);
        assert!(conn.retry_deadline().is_none());
    }

    #[test]
    fn auto_reconnect_disabled_stays_disconnected() {
        let t0 = Instant::now();
        let config = ReconnectConfig { auto_reconnect: false, ..ReconnectConfig::default() };
        let mut conn = ConnectionManager::new(t0, config);
        let socket = opened_socket(&conn.connect(t0));

        conn.handle_close(socket, t0);

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.retry().attempt, 0);
        assert!(conn.retry_deadline().is_none());
    }

    #[test]
    fn teardown_cancels_everything() {
        let (mut conn, t0) = manager(5);
        let socket = opened_socket(&conn.connect(t0));
        conn.handle_close(socket, t0);
        let socket = opened_socket(&conn.force_reconnect(t0));

        let actions = conn.teardown();
        assert_eq!(actions, vec![ConnectionAction::CloseSocket { socket }]);
        assert!(conn.next_deadline().is_none());

        // Late callbacks and timers are no-ops
        conn.handle_close(socket, t0);
        assert!(conn.tick(t0 + Duration::from_secs(3600)).is_empty());
        assert!(conn.connect(t0).is_empty());
        assert!(conn.force_reconnect(t0).is_empty());
        assert!(conn.teardown().is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> =
            (0..7).map(|a| config.delay_for_attempt(a).as_millis() as u64).collect();

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(config.delay_for_attempt(u32::MAX), DEFAULT_BACKOFF_CAP);
    }

    #[test]
    fn state_names_are_lowercase() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }
}
