//! Splitting a parent execution into child executions.

use std::sync::Arc;

use async_trait::async_trait;
use shardline_core::WorkExecution;
use shardline_storage::ExecutionRepository;
use tracing::debug;

/// Context key holding a child's zero-based partition index.
pub const PARTITION_KEY: &str = "partition";

/// Context key holding the number of partitions of the parent.
pub const PARTITION_COUNT_KEY: &str = "partition_count";

/// Strategy for splitting a parent execution.
///
/// Called once per `handle` invocation.
#[async_trait]
pub trait Splitter: Send + Sync {
    /// Produce the child executions of `parent`. An empty result means there
    /// is nothing to coordinate.
    async fn split(
        &self,
        parent: &WorkExecution,
        grid_size: usize,
    ) -> anyhow::Result<Vec<WorkExecution>>;
}

/// Splits a parent into `grid_size` numbered partitions.
///
/// Children are named `"{parent}:partition{i}"` and carry their index and the
/// partition count in their context. With a repository attached every child
/// is saved before it is returned, so the store can be polled for it.
#[derive(Default)]
pub struct SimpleSplitter {
    repository: Option<Arc<dyn ExecutionRepository>>,
}

impl SimpleSplitter {
    /// Create a splitter that does not persist children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every child in `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn ExecutionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }
}

#[async_trait]
impl Splitter for SimpleSplitter {
    async fn split(
        &self,
        parent: &WorkExecution,
        grid_size: usize,
    ) -> anyhow::Result<Vec<WorkExecution>> {
        let mut children = Vec::with_capacity(grid_size);
        for i in 0..grid_size {
            let child = WorkExecution::child(parent, format!("partition{}", i))
                .with_context(PARTITION_KEY, i)
                .with_context(PARTITION_COUNT_KEY, grid_size);

            if let Some(repository) = &self.repository {
                repository.save(&child).await?;
            }
            children.push(child);
        }

        debug!("Split {} into {} partitions", parent.name, children.len());
        Ok(children)
    }
}
