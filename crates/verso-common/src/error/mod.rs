//! Error handling for VersoDB.
//!
//! This module provides the unified error type used across the
//! concurrency-control components.
//!
//! Only recoverable, caller-facing conditions surface as errors here.
//! Violated internal invariants (for example a watermark ordering violation
//! with long-running transactions disabled) indicate corrupted version
//! chains and are raised as panics at the point of detection.

use thiserror::Error;

use crate::types::{TxId, WorkerId};

/// Result type alias for VersoDB operations.
pub type VersoResult<T> = std::result::Result<T, VersoError>;

/// Errors that can occur in the VersoDB concurrency-control layer.
#[derive(Debug, Error)]
pub enum VersoError {
    /// A transaction is already active on this worker.
    #[error("worker {worker_id} already has an active transaction (start_ts {start_ts})")]
    TransactionActive {
        /// The worker with the active transaction.
        worker_id: WorkerId,
        /// The start timestamp of the active transaction.
        start_ts: TxId,
    },

    /// The operation requires an active transaction but none is running.
    #[error("worker {worker_id} has no active transaction")]
    TransactionNotActive {
        /// The worker missing an active transaction.
        worker_id: WorkerId,
    },

    /// Configuration error.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl VersoError {
    /// Creates a config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns true if the error indicates API misuse of the transaction
    /// lifecycle rather than bad input.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::TransactionActive { .. } | Self::TransactionNotActive { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VersoError::TransactionActive {
            worker_id: WorkerId::new(2),
            start_ts: TxId::new(40),
        };
        let msg = format!("{}", err);
        assert!(msg.contains('2'));
        assert!(msg.contains("40"));
        assert!(err.is_lifecycle());
    }

    #[test]
    fn test_config_error() {
        let err = VersoError::invalid_config("worker count must be positive");
        assert!(!err.is_lifecycle());
        assert!(format!("{}", err).contains("worker count"));
    }
}
