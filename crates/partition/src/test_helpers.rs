//! Scripted collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use shardline_core::{ExecutionId, WorkExecution};
use shardline_messaging::{
    ChannelName, DispatchMessage, GatewayError, MessagingGateway, ReplyMessage,
};
use shardline_storage::{ExecutionStore, StorageError};
use tokio::time::Instant;

use crate::splitter::Splitter;

pub fn children_of(parent: &WorkExecution, n: usize) -> Vec<WorkExecution> {
    (0..n)
        .map(|i| WorkExecution::child(parent, format!("partition{}", i)))
        .collect()
}

/// Returns a fixed set of children and records the grid sizes it was asked for.
pub struct FixedSplitter {
    children: Vec<WorkExecution>,
    requested: Mutex<Vec<usize>>,
}

impl FixedSplitter {
    pub fn new(children: Vec<WorkExecution>) -> Self {
        Self {
            children,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn requested_grid_sizes(&self) -> Vec<usize> {
        self.requested.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl Splitter for FixedSplitter {
    async fn split(
        &self,
        _parent: &WorkExecution,
        grid_size: usize,
    ) -> anyhow::Result<Vec<WorkExecution>> {
        self.requested.lock().expect("poisoned mutex").push(grid_size);
        Ok(self.children.clone())
    }
}

pub struct FailingSplitter;

#[async_trait]
impl Splitter for FailingSplitter {
    async fn split(
        &self,
        _parent: &WorkExecution,
        _grid_size: usize,
    ) -> anyhow::Result<Vec<WorkExecution>> {
        Err(anyhow::anyhow!("splitter exploded"))
    }
}

/// Captures sends and answers receives with a prepared reply, or waits out
/// the timeout when there is none.
pub struct RecordingGateway {
    sent: Mutex<Vec<DispatchMessage>>,
    received_on: Mutex<Vec<Option<ChannelName>>>,
    reply: Mutex<Option<ReplyMessage>>,
    fail_sends: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            received_on: Mutex::new(Vec::new()),
            reply: Mutex::new(None),
            fail_sends: false,
        }
    }

    pub fn with_reply(self, reply: ReplyMessage) -> Self {
        *self.reply.lock().expect("poisoned mutex") = Some(reply);
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<DispatchMessage> {
        self.sent.lock().expect("poisoned mutex").clone()
    }

    pub fn received_on(&self) -> Vec<Option<ChannelName>> {
        self.received_on.lock().expect("poisoned mutex").clone()
    }

    pub fn receive_count(&self) -> usize {
        self.received_on.lock().expect("poisoned mutex").len()
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send(&self, message: DispatchMessage) -> shardline_messaging::Result<()> {
        if self.fail_sends {
            return Err(GatewayError::Closed("requests".to_string()));
        }
        self.sent.lock().expect("poisoned mutex").push(message);
        Ok(())
    }

    async fn receive(
        &self,
        channel: Option<&ChannelName>,
        timeout: Duration,
    ) -> shardline_messaging::Result<Option<ReplyMessage>> {
        self.received_on
            .lock()
            .expect("poisoned mutex")
            .push(channel.cloned());
        let reply = self.reply.lock().expect("poisoned mutex").take();
        if reply.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(reply)
    }
}

/// Answers lookups from a per-child script. Each lookup consumes the next
/// scripted value; the last one repeats. Children without a script are
/// unknown to the store.
pub struct ScriptedStore {
    scripts: Mutex<HashMap<ExecutionId, Vec<WorkExecution>>>,
    lookups: Mutex<Vec<(Instant, ExecutionId)>>,
    fail: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            lookups: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn script(self, child_id: ExecutionId, values: Vec<WorkExecution>) -> Self {
        self.scripts
            .lock()
            .expect("poisoned mutex")
            .insert(child_id, values);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn lookups(&self) -> Vec<ExecutionId> {
        self.lookups
            .lock()
            .expect("poisoned mutex")
            .iter()
            .map(|(_, id)| *id)
            .collect()
    }

    /// Lookups grouped by the instant they happened at. With a paused clock
    /// every polling round happens at a single instant.
    pub fn rounds(&self) -> Vec<Vec<ExecutionId>> {
        let lookups = self.lookups.lock().expect("poisoned mutex");
        let mut rounds: Vec<Vec<ExecutionId>> = Vec::new();
        let mut last: Option<Instant> = None;
        for (at, id) in lookups.iter() {
            match (last, rounds.last_mut()) {
                (Some(previous), Some(round)) if previous == *at => round.push(*id),
                _ => rounds.push(vec![*id]),
            }
            last = Some(*at);
        }
        rounds
    }
}

#[async_trait]
impl ExecutionStore for ScriptedStore {
    async fn lookup(
        &self,
        _parent_id: ExecutionId,
        child_id: ExecutionId,
    ) -> shardline_storage::Result<Option<WorkExecution>> {
        if self.fail {
            return Err(StorageError::Other("store unavailable".to_string()));
        }
        self.lookups
            .lock()
            .expect("poisoned mutex")
            .push((Instant::now(), child_id));

        let mut scripts = self.scripts.lock().expect("poisoned mutex");
        let Some(script) = scripts.get_mut(&child_id) else {
            return Ok(None);
        };
        let value = if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        };
        Ok(Some(value))
    }
}
