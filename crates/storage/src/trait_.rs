//! Execution store traits.

use async_trait::async_trait;
use shardline_core::{ExecutionId, WorkExecution};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read access to recorded execution status.
///
/// The partition handler only ever reads through this trait; workers and
/// splitters write through [`ExecutionRepository`].
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Look up the latest recorded state of a child execution.
    async fn lookup(
        &self,
        parent_id: ExecutionId,
        child_id: ExecutionId,
    ) -> Result<Option<WorkExecution>>;
}

/// Write access for the components that create and advance executions.
#[async_trait]
pub trait ExecutionRepository: ExecutionStore {
    /// Save an execution (create or update). The execution must have a parent.
    async fn save(&self, execution: &WorkExecution) -> Result<()>;

    /// List the recorded children of a parent execution.
    async fn list_children(&self, parent_id: ExecutionId) -> Result<Vec<WorkExecution>>;
}

/// Parent id of a child execution, or an error for a parent.
pub(crate) fn require_parent(execution: &WorkExecution) -> Result<ExecutionId> {
    execution.parent_id.ok_or_else(|| {
        StorageError::Other(format!(
            "execution {} has no parent and cannot be stored as a partition",
            execution.id
        ))
    })
}
