//! Work execution model - the unit tracked through splitting, dispatch and
//! completion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ExecutionId;
use crate::Time;

/// Partition parameters attached to an execution.
pub type ExecutionContext = BTreeMap<String, serde_json::Value>;

/// Status of a work execution.
///
/// `Completed`, `Failed` and `Stopped` are terminal. A status only ever moves
/// forward toward a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created but not yet picked up by a worker
    NotStarted,
    /// A worker is running it
    Started,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped before finishing
    Stopped,
    /// Status could not be determined
    Unknown,
}

impl ExecutionStatus {
    /// Whether no further transition can happen from this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Serialized name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parent execution or one of its partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkExecution {
    /// Unique identifier
    pub id: ExecutionId,

    /// Owning parent execution; `None` for the parent itself
    pub parent_id: Option<ExecutionId>,

    /// Human-readable label
    pub name: String,

    /// Current status
    pub status: ExecutionStatus,

    /// Partition parameters
    #[serde(default)]
    pub context: ExecutionContext,

    /// When a worker started it
    #[serde(default)]
    pub started_at: Option<Time>,

    /// When it reached a terminal status
    #[serde(default)]
    pub ended_at: Option<Time>,

    /// Message reported by the worker on exit
    #[serde(default)]
    pub exit_message: Option<String>,
}

impl WorkExecution {
    /// Create a parent execution.
    pub fn parent(name: impl Into<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            parent_id: None,
            name: name.into(),
            status: ExecutionStatus::NotStarted,
            context: ExecutionContext::new(),
            started_at: None,
            ended_at: None,
            exit_message: None,
        }
    }

    /// Create a child of `parent`, named `"{parent}:{suffix}"`.
    pub fn child(parent: &WorkExecution, suffix: impl AsRef<str>) -> Self {
        Self {
            id: ExecutionId::new(),
            parent_id: Some(parent.id),
            name: format!("{}:{}", parent.name, suffix.as_ref()),
            status: ExecutionStatus::NotStarted,
            context: ExecutionContext::new(),
            started_at: None,
            ended_at: None,
            exit_message: None,
        }
    }

    /// Set the status (builder style).
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Add a context entry (builder style).
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Whether the execution reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark as started. Returns false if the execution already started or
    /// finished.
    pub fn start(&mut self) -> bool {
        if self.status != ExecutionStatus::NotStarted && self.status != ExecutionStatus::Unknown {
            return false;
        }
        self.status = ExecutionStatus::Started;
        self.started_at = Some(chrono::Utc::now());
        true
    }

    /// Move to a terminal status. Returns false (and changes nothing) if the
    /// execution is already terminal or `status` is not terminal.
    pub fn finish(&mut self, status: ExecutionStatus, exit_message: Option<String>) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        let now = chrono::Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = status;
        self.ended_at = Some(now);
        self.exit_message = exit_message;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Stopped.is_terminal());
        assert!(!ExecutionStatus::NotStarted.is_terminal());
        assert!(!ExecutionStatus::Started.is_terminal());
        assert!(!ExecutionStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_status_serialization_matches_display() {
        let json = serde_json::to_string(&ExecutionStatus::NotStarted).unwrap();
        assert_eq!(json, "\"NOT_STARTED\"");
        assert_eq!(ExecutionStatus::NotStarted.to_string(), "NOT_STARTED");
    }

    #[test]
    fn test_child_naming() {
        let parent = WorkExecution::parent("step1");
        let child = WorkExecution::child(&parent, "partition0");

        assert_eq!(child.name, "step1:partition0");
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.status, ExecutionStatus::NotStarted);
        assert_ne!(child.id, parent.id);
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let parent = WorkExecution::parent("step1");
        let mut child = WorkExecution::child(&parent, "partition0");

        assert!(child.start());
        assert!(!child.start());
        assert!(child.started_at.is_some());

        assert!(!child.finish(ExecutionStatus::Started, None));
        assert!(child.finish(ExecutionStatus::Completed, Some("ok".to_string())));
        assert_eq!(child.status, ExecutionStatus::Completed);
        assert!(child.ended_at.is_some());

        assert!(!child.finish(ExecutionStatus::Failed, None));
        assert!(!child.start());
        assert_eq!(child.status, ExecutionStatus::Completed);
        assert_eq!(child.exit_message.as_deref(), Some("ok"));
    }

    #[test]
    fn test_deserializes_without_optional_fields() {
        let id = ExecutionId::new();
        let json = format!(r#"{{"id":"{}","parent_id":null,"name":"p","status":"STARTED"}}"#, id);
        let execution: WorkExecution = serde_json::from_str(&json).unwrap();

        assert_eq!(execution.id, id);
        assert_eq!(execution.status, ExecutionStatus::Started);
        assert!(execution.context.is_empty());
    }
}
