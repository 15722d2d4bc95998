//! Completion strategies: how the handler learns that every dispatched
//! child finished.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shardline_core::WorkExecution;
use shardline_messaging::{ChannelName, MessagingGateway};
use shardline_storage::ExecutionStore;
use tracing::{debug, info, warn};

use crate::config::HandlerConfig;
use crate::error::{PartitionError, Result};
use crate::tracker::CompletionTracker;

/// Waits for the outcome of already dispatched children.
#[async_trait]
pub trait CompletionStrategy: Send + Sync {
    /// Resolve once every child of `parent` in `dispatched` is accounted for,
    /// or fail with [`PartitionError::Timeout`].
    async fn await_completion(
        &self,
        parent: &WorkExecution,
        dispatched: Vec<WorkExecution>,
    ) -> Result<Vec<WorkExecution>>;
}

/// Waits for a single aggregated reply message.
///
/// The first reply on the channel is taken, whatever parent it is correlated
/// to; a mismatch is only logged. A reply published after an earlier `handle`
/// timed out is therefore returned to the next `handle` on the same channel.
/// Give concurrent or retried parents their own reply channel.
pub struct ReplyCompletion {
    gateway: Arc<dyn MessagingGateway>,
    reply_channel: Option<ChannelName>,
    timeout: Duration,
}

impl ReplyCompletion {
    /// Create a reply strategy from the handler configuration.
    pub fn new(gateway: Arc<dyn MessagingGateway>, config: &HandlerConfig) -> Self {
        Self {
            gateway,
            reply_channel: config.reply_channel.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl CompletionStrategy for ReplyCompletion {
    async fn await_completion(
        &self,
        parent: &WorkExecution,
        dispatched: Vec<WorkExecution>,
    ) -> Result<Vec<WorkExecution>> {
        debug!(
            "Awaiting reply for {} on {}",
            parent.name,
            self.reply_channel
                .as_ref()
                .map(ChannelName::as_str)
                .unwrap_or("default channel")
        );

        let Some(reply) = self
            .gateway
            .receive(self.reply_channel.as_ref(), self.timeout)
            .await?
        else {
            warn!("No reply for {} within {:?}", parent.name, self.timeout);
            return Err(PartitionError::Timeout {
                waited: self.timeout,
                pending: dispatched.len(),
            });
        };

        if let Some(correlation_id) = reply.correlation_id {
            if correlation_id != parent.id {
                warn!(
                    "Reply correlated to {} received while handling {}",
                    correlation_id, parent.id
                );
            }
        }

        let results = reply.into_payload();
        info!("Reply for {} reported {} execution(s)", parent.name, results.len());
        Ok(results)
    }
}

/// Polls an execution store until every child is terminal.
pub struct PollingCompletion {
    store: Arc<dyn ExecutionStore>,
    poll_interval: Duration,
    timeout: Duration,
}

impl PollingCompletion {
    /// Create a polling strategy from the handler configuration.
    pub fn new(store: Arc<dyn ExecutionStore>, config: &HandlerConfig) -> Self {
        Self {
            store,
            poll_interval: config.effective_poll_interval(),
            timeout: config.timeout,
        }
    }
}

impl PollingCompletion {
    /// Poll rounds spaced by the full interval until nothing is pending.
    /// Returns the number of rounds it took.
    async fn poll_until_complete(
        &self,
        parent: &WorkExecution,
        tracker: &mut CompletionTracker,
    ) -> Result<usize> {
        let mut round = 0usize;
        loop {
            round += 1;
            for child_id in tracker.pending_ids() {
                if let Some(update) = self.store.lookup(parent.id, child_id).await? {
                    tracker.observe(update);
                }
            }

            if tracker.is_complete() {
                return Ok(round);
            }

            debug!(
                "Round {} for {}: {}/{} partitions pending",
                round,
                parent.name,
                tracker.pending_count(),
                tracker.len()
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl CompletionStrategy for PollingCompletion {
    async fn await_completion(
        &self,
        parent: &WorkExecution,
        dispatched: Vec<WorkExecution>,
    ) -> Result<Vec<WorkExecution>> {
        let mut tracker = CompletionTracker::new(dispatched);

        // The deadline races the whole loop and wins ties, so no round runs
        // at or after it.
        let polled = {
            let deadline = tokio::time::sleep(self.timeout);
            tokio::select! {
                biased;
                _ = deadline => None,
                polled = self.poll_until_complete(parent, &mut tracker) => Some(polled),
            }
        };

        match polled {
            Some(Ok(rounds)) => {
                info!(
                    "All {} partitions of {} finished after {} polling round(s)",
                    tracker.len(),
                    parent.name,
                    rounds
                );
                Ok(tracker.into_executions())
            }
            Some(Err(e)) => Err(e),
            None => {
                warn!(
                    "Gave up on {} after {:?}: {} partition(s) still running",
                    parent.name,
                    self.timeout,
                    tracker.pending_count()
                );
                Err(PartitionError::Timeout {
                    waited: self.timeout,
                    pending: tracker.pending_count(),
                })
            }
        }
    }
}

/// Completion strategies available.
pub enum CompletionMode {
    /// Single aggregated reply
    Reply(ReplyCompletion),
    /// Execution store polling
    Polling(PollingCompletion),
}

#[async_trait]
impl CompletionStrategy for CompletionMode {
    async fn await_completion(
        &self,
        parent: &WorkExecution,
        dispatched: Vec<WorkExecution>,
    ) -> Result<Vec<WorkExecution>> {
        match self {
            Self::Reply(s) => s.await_completion(parent, dispatched).await,
            Self::Polling(s) => s.await_completion(parent, dispatched).await,
        }
    }
}
