//! JSON file execution store.
//!
//! Stores every child execution as a pretty-printed JSON file under
//! `<root>/executions/<parent_id>/<child_id>.json`. Writes go through a
//! temporary file and a rename so a concurrent reader never observes a
//! partially written execution.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shardline_core::{ExecutionId, WorkExecution};
use tokio::fs;
use tracing::debug;

use super::trait_::require_parent;
use super::{ExecutionRepository, ExecutionStore, Result};

/// File-based JSON execution store.
pub struct JsonExecutionStore {
    root: PathBuf,
}

impl JsonExecutionStore {
    /// Create storage rooted at `root`, creating the `executions/` directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("executions")).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parent_dir(&self, parent_id: ExecutionId) -> PathBuf {
        self.root.join("executions").join(parent_id.to_string())
    }

    fn execution_path(&self, parent_id: ExecutionId, child_id: ExecutionId) -> PathBuf {
        self.parent_dir(parent_id).join(format!("{}.json", child_id))
    }
}

#[async_trait]
impl ExecutionStore for JsonExecutionStore {
    async fn lookup(
        &self,
        parent_id: ExecutionId,
        child_id: ExecutionId,
    ) -> Result<Option<WorkExecution>> {
        read_json(&self.execution_path(parent_id, child_id)).await
    }
}

#[async_trait]
impl ExecutionRepository for JsonExecutionStore {
    async fn save(&self, execution: &WorkExecution) -> Result<()> {
        let parent_id = require_parent(execution)?;
        fs::create_dir_all(self.parent_dir(parent_id)).await?;

        let path = self.execution_path(parent_id, execution.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(execution)?;
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        debug!("Saved execution {} ({}) as {}", execution.id, execution.status, path.display());
        Ok(())
    }

    async fn list_children(&self, parent_id: ExecutionId) -> Result<Vec<WorkExecution>> {
        let dir = self.parent_dir(parent_id);
        if fs::metadata(&dir).await.is_err() {
            return Ok(Vec::new());
        }
        let mut children = list_dir(&dir).await?;
        children.sort_by(|a: &WorkExecution, b| a.name.cmp(&b.name));
        Ok(children)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}
