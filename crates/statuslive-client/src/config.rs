//! Live-update configuration.

use statuslive_core::{PolicyConfig, ReconnectConfig};

/// Configuration for a [`LiveUpdates`](crate::LiveUpdates) instance.
///
/// Read once at startup; changing it requires starting a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Push endpoint (`ws://` or `wss://` URL)
    pub endpoint: String,
    /// Log every inbound frame and outbound send at `info`
    pub debug: bool,
    /// Backoff, retry limit and health check
    pub reconnect: ReconnectConfig,
    /// Debounce and fallback refresh timing
    pub policy: PolicyConfig,
}

impl LiveConfig {
    /// Default timing for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            debug: false,
            reconnect: ReconnectConfig::default(),
            policy: PolicyConfig::default(),
        }
    }

    /// Enable or disable frame-level logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the reconnect configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the policy configuration.
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }
}
