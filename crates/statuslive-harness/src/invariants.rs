//! Snapshot invariants.
//!
//! Checks what must be true of every published connection snapshot,
//! independent of the scenario that produced it.

use statuslive_client::Snapshot;
use statuslive_core::ConnectionState;
use thiserror::Error;

/// A broken snapshot invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Retry count went past the configured limit
    #[error("retry count {retry_count} exceeds max attempts {max_attempts}")]
    RetryCountAboveLimit {
        /// Observed retry count
        retry_count: u32,
        /// Configured limit
        max_attempts: u32,
    },

    /// Connected while still counting retries
    #[error("connected with non-zero retry count {0}")]
    ConnectedWithRetries(u32),
}

/// Check one snapshot against the reconnect limit it was produced under.
///
/// # Errors
///
/// Returns the first violated invariant.
pub fn check_snapshot(snapshot: &Snapshot, max_attempts: u32) -> Result<(), Violation> {
    if snapshot.retry_count > max_attempts {
        return Err(Violation::RetryCountAboveLimit {
            retry_count: snapshot.retry_count,
            max_attempts,
        });
    }

    if snapshot.state == ConnectionState::Connected && snapshot.retry_count != 0 {
        return Err(Violation::ConnectedWithRetries(snapshot.retry_count));
    }

    Ok(())
}
