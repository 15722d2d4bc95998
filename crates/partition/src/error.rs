//! Errors raised by the partition handler.

use std::time::Duration;

use shardline_messaging::GatewayError;
use shardline_storage::StorageError;

/// Result type for partition operations.
pub type Result<T> = std::result::Result<T, PartitionError>;

/// Errors that can occur while handling a partitioned execution.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// Completion could not be confirmed before the deadline
    #[error("timed out after {waited:?} with {pending} partition(s) unfinished")]
    Timeout {
        /// Time spent waiting after dispatch
        waited: Duration,
        /// Children still without a confirmed terminal status
        pending: usize,
    },

    /// The splitter failed
    #[error(transparent)]
    Split(anyhow::Error),

    /// The messaging gateway failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The execution store failed
    #[error(transparent)]
    Store(#[from] StorageError),

    /// The handler configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PartitionError {
    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
