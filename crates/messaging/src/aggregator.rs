//! Reply aggregation on the remote side.
//!
//! Workers finish children independently, but the reply protocol expects one
//! message per parent. The aggregator groups finished children by correlation
//! id and releases a group once `sequence_size` distinct children arrived.

use std::collections::HashMap;

use shardline_core::{ExecutionId, WorkExecution};
use tokio::sync::Mutex;
use tracing::debug;

use crate::message::{MessageHeaders, ReplyMessage};

struct Group {
    expected: usize,
    executions: Vec<WorkExecution>,
}

/// Groups finished child executions into one reply per parent.
#[derive(Default)]
pub struct ReplyAggregator {
    groups: Mutex<HashMap<ExecutionId, Group>>,
}

impl ReplyAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a finished child. Returns the complete reply once the last
    /// missing child of its parent arrives.
    pub async fn offer(
        &self,
        headers: &MessageHeaders,
        execution: WorkExecution,
    ) -> Option<ReplyMessage> {
        let mut groups = self.groups.lock().await;
        let group = groups.entry(headers.correlation_id).or_insert_with(|| Group {
            expected: headers.sequence_size,
            executions: Vec::with_capacity(headers.sequence_size),
        });

        match group.executions.iter_mut().find(|e| e.id == execution.id) {
            Some(existing) => *existing = execution,
            None => group.executions.push(execution),
        }

        debug!(
            "Aggregated {}/{} replies for {}",
            group.executions.len(),
            group.expected,
            headers.correlation_id
        );

        if group.executions.len() < group.expected {
            return None;
        }

        groups
            .remove(&headers.correlation_id)
            .map(|group| ReplyMessage::correlated(headers.correlation_id, group.executions))
    }

    /// Number of parents with replies still outstanding.
    pub async fn pending_groups(&self) -> usize {
        self.groups.lock().await.len()
    }
}
