//! Working set of dispatched children for one `handle` call.

use std::collections::HashMap;

use shardline_core::{ExecutionId, WorkExecution};

/// Best-known state of every dispatched child, in split order.
///
/// Entries are replaced by newer observations until they turn terminal;
/// after that they never change. Observations for ids that were not
/// dispatched are ignored, so the result always has exactly one entry per
/// dispatched child.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    executions: Vec<WorkExecution>,
    index: HashMap<ExecutionId, usize>,
}

impl CompletionTracker {
    /// Start tracking the pre-dispatch values of `children`.
    pub fn new(children: Vec<WorkExecution>) -> Self {
        let mut index = HashMap::with_capacity(children.len());
        for (position, child) in children.iter().enumerate() {
            index.entry(child.id).or_insert(position);
        }
        Self {
            executions: children,
            index,
        }
    }

    /// Ids of children whose best-known status is not terminal.
    pub fn pending_ids(&self) -> Vec<ExecutionId> {
        self.executions
            .iter()
            .filter(|e| !e.is_terminal())
            .map(|e| e.id)
            .collect()
    }

    /// Number of children not yet terminal.
    pub fn pending_count(&self) -> usize {
        self.executions.iter().filter(|e| !e.is_terminal()).count()
    }

    /// Record a newer observation. Returns true if the entry changed.
    pub fn observe(&mut self, update: WorkExecution) -> bool {
        let Some(&position) = self.index.get(&update.id) else {
            return false;
        };
        let current = &mut self.executions[position];
        if current.is_terminal() || *current == update {
            return false;
        }
        *current = update;
        true
    }

    /// Whether every child is terminal.
    pub fn is_complete(&self) -> bool {
        self.executions.iter().all(WorkExecution::is_terminal)
    }

    /// Number of tracked children.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// The working set, in split order.
    pub fn into_executions(self) -> Vec<WorkExecution> {
        self.executions
    }
}
