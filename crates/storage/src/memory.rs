//! In-memory execution store.

use std::collections::HashMap;

use async_trait::async_trait;
use shardline_core::{ExecutionId, WorkExecution};
use tokio::sync::RwLock;

use super::trait_::require_parent;
use super::{ExecutionRepository, ExecutionStore, Result};

/// Execution store kept in process memory, keyed by parent then child id.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<ExecutionId, HashMap<ExecutionId, WorkExecution>>>,
}

impl InMemoryExecutionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored child executions.
    pub async fn len(&self) -> usize {
        self.executions.read().await.values().map(HashMap::len).sum()
    }

    /// Whether the store holds no executions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn lookup(
        &self,
        parent_id: ExecutionId,
        child_id: ExecutionId,
    ) -> Result<Option<WorkExecution>> {
        let executions = self.executions.read().await;
        Ok(executions
            .get(&parent_id)
            .and_then(|children| children.get(&child_id))
            .cloned())
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkExecution) -> Result<()> {
        let parent_id = require_parent(execution)?;
        self.executions
            .write()
            .await
            .entry(parent_id)
            .or_default()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn list_children(&self, parent_id: ExecutionId) -> Result<Vec<WorkExecution>> {
        let executions = self.executions.read().await;
        let mut children: Vec<_> = executions
            .get(&parent_id)
            .map(|children| children.values().cloned().collect())
            .unwrap_or_default();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}
