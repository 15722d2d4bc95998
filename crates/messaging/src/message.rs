//! Dispatch and reply envelopes.

use serde::{Deserialize, Serialize};
use shardline_core::{ExecutionId, WorkExecution};

/// Name of a reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(pub String);

impl ChannelName {
    /// Create a channel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Channel used when no explicit reply channel is configured.
    pub fn default_replies() -> Self {
        Self("replies".to_string())
    }

    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation headers stamped on every dispatch of one partitioned parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Parent execution the dispatch belongs to
    pub correlation_id: ExecutionId,

    /// Position of this dispatch, starting at 1
    pub sequence_number: usize,

    /// Number of dispatches sent for the parent
    pub sequence_size: usize,

    /// Channel the remote side should reply on
    pub reply_to: Option<ChannelName>,
}

/// Request for a remote worker to run one child execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    /// Name of the remote step to run
    pub step_name: String,

    /// The child execution
    pub execution: WorkExecution,

    /// Correlation headers
    pub headers: MessageHeaders,
}

/// Finished child executions reported back by the remote side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplyMessage {
    /// Parent execution the reply belongs to, when known
    pub correlation_id: Option<ExecutionId>,

    /// Reported executions; may be empty
    pub executions: Vec<WorkExecution>,
}

impl ReplyMessage {
    /// Reply for a given parent.
    pub fn correlated(correlation_id: ExecutionId, executions: Vec<WorkExecution>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            executions,
        }
    }

    /// Take the payload.
    pub fn into_payload(self) -> Vec<WorkExecution> {
        self.executions
    }
}
