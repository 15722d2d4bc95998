//! The partition handler - splits, dispatches, and aggregates.

use std::sync::Arc;

use shardline_core::WorkExecution;
use shardline_messaging::{DispatchMessage, MessageHeaders, MessagingGateway};
use shardline_storage::ExecutionStore;
use tracing::{debug, info};

use crate::completion::{CompletionMode, CompletionStrategy, PollingCompletion, ReplyCompletion};
use crate::config::HandlerConfig;
use crate::error::{PartitionError, Result};
use crate::splitter::Splitter;

/// Coordinates one partitioned execution at a time per `handle` call.
///
/// ```text
/// Split → Dispatch (one send per child) → Await completion
/// ```
///
/// The completion strategy is fixed at construction: reply mode by default,
/// polling mode once an execution store is attached with
/// [`with_store`](Self::with_store). The handler holds no per-call state, so
/// concurrent `handle` calls are independent.
pub struct PartitionHandler {
    gateway: Arc<dyn MessagingGateway>,
    completion: Box<dyn CompletionStrategy>,
    config: HandlerConfig,
}

impl PartitionHandler {
    /// Create a handler in reply mode.
    pub fn new(gateway: Arc<dyn MessagingGateway>, config: HandlerConfig) -> Result<Self> {
        config.validate()?;
        let completion = CompletionMode::Reply(ReplyCompletion::new(gateway.clone(), &config));
        Ok(Self {
            gateway,
            completion: Box::new(completion),
            config,
        })
    }

    /// Switch to polling `store` for child status.
    pub fn with_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.completion = Box::new(CompletionMode::Polling(PollingCompletion::new(
            store,
            &self.config,
        )));
        self
    }

    /// Use a custom completion strategy.
    pub fn with_completion(mut self, completion: Box<dyn CompletionStrategy>) -> Self {
        self.completion = completion;
        self
    }

    /// The configuration the handler was built with.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Split `parent`, dispatch every child, and wait for all of them.
    ///
    /// Returns `Ok(None)` without dispatching when the splitter produces no
    /// children. Collaborator errors are returned unchanged; there is no
    /// partial result.
    pub async fn handle(
        &self,
        splitter: &dyn Splitter,
        parent: &WorkExecution,
    ) -> Result<Option<Vec<WorkExecution>>> {
        let children = splitter
            .split(parent, self.config.grid_size)
            .await
            .map_err(PartitionError::Split)?;

        if children.is_empty() {
            info!("No partitions for {}, nothing to dispatch", parent.name);
            return Ok(None);
        }

        let sequence_size = children.len();
        for (position, child) in children.iter().enumerate() {
            let message = DispatchMessage {
                step_name: self.config.step_name.clone(),
                execution: child.clone(),
                headers: MessageHeaders {
                    correlation_id: parent.id,
                    sequence_number: position + 1,
                    sequence_size,
                    reply_to: self.config.reply_channel.clone(),
                },
            };
            self.gateway.send(message).await?;
            debug!("Sent {} to step {}", child.name, self.config.step_name);
        }
        info!("Dispatched {} partitions of {}", sequence_size, parent.name);

        let results = self.completion.await_completion(parent, children).await?;
        Ok(Some(results))
    }
}
