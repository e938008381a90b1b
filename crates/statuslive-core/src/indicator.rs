//! Connection status affordance.
//!
//! A small view model derived from connection state, never a blocking error:
//! live updates are an enhancement and views keep working through manual and
//! fallback refreshes while this shows the connection as down.

use std::fmt;

use crate::connection::ConnectionState;

/// Color family of the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Connected
    Positive,
    /// Connecting
    Pending,
    /// Disconnected or failed
    Negative,
}

/// What to show for the current connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    /// Short human-readable label
    pub label: String,
    /// Color family
    pub tone: Tone,
    /// Whether the icon animates (only while connecting)
    pub spinning: bool,
    /// Whether a manual "retry" affordance is offered
    pub show_retry: bool,
}

impl StatusIndicator {
    /// Build the indicator for `state`.
    ///
    /// `retry_count` only appears in the label of the error state.
    /// `retry_enabled` lets embedders hide the retry affordance entirely; when
    /// enabled it is shown whenever the connection is not up.
    pub fn new(state: ConnectionState, retry_count: u32, retry_enabled: bool) -> Self {
        let (label, tone) = match state {
            ConnectionState::Connected => ("Live".to_owned(), Tone::Positive),
            ConnectionState::Connecting => ("Connecting...".to_owned(), Tone::Pending),
            ConnectionState::Error => (format!("Failed ({retry_count} retries)"), Tone::Negative),
            ConnectionState::Disconnected => ("Offline".to_owned(), Tone::Negative),
        };

        Self {
            label,
            tone,
            spinning: state == ConnectionState::Connecting,
            show_retry: retry_enabled && !state.is_connected(),
        }
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        if self.show_retry {
            f.write_str(" [retry]")?;
        }
        Ok(())
    }
}
