//! Remote side of a dispatch: runs child executions and reports them.

use std::sync::Arc;

use async_trait::async_trait;
use shardline_core::{ExecutionStatus, WorkExecution};
use shardline_messaging::{DispatchMessage, InMemoryGateway, ReplyAggregator};
use shardline_storage::ExecutionRepository;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Business logic of a remote step.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `step_name` for one child execution.
    async fn run(&self, step_name: &str, execution: &WorkExecution) -> anyhow::Result<()>;
}

/// Pulls dispatches from an in-process gateway and runs them.
///
/// Every transition is saved to the repository, so a polling handler sees
/// progress. With an aggregator attached, finished children are also
/// collected into one reply per parent and published on the dispatch's
/// reply channel.
pub struct PartitionWorker {
    name: String,
    gateway: Arc<InMemoryGateway>,
    repository: Arc<dyn ExecutionRepository>,
    runner: Arc<dyn StepRunner>,
    aggregator: Option<Arc<ReplyAggregator>>,
}

impl PartitionWorker {
    /// Create a worker.
    pub fn new(
        name: impl Into<String>,
        gateway: Arc<InMemoryGateway>,
        repository: Arc<dyn ExecutionRepository>,
        runner: Arc<dyn StepRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            gateway,
            repository,
            runner,
            aggregator: None,
        }
    }

    /// Aggregate finished children into replies.
    pub fn with_aggregator(mut self, aggregator: Arc<ReplyAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Process dispatches until the gateway is closed. Returns how many
    /// dispatches were processed.
    pub async fn run(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(message) = self.gateway.next_request().await {
            self.process(message).await?;
            processed += 1;
        }
        debug!("Worker {} stopping after {} dispatch(es)", self.name, processed);
        Ok(processed)
    }

    /// Run one dispatched child and report it. Returns the final state.
    ///
    /// A child the repository already records as terminal is not run again;
    /// its recorded state is reported instead.
    pub async fn process(&self, message: DispatchMessage) -> Result<WorkExecution> {
        let DispatchMessage {
            step_name,
            execution,
            headers,
        } = message;
        let parent_id = headers.correlation_id;

        let mut execution = match self.repository.lookup(parent_id, execution.id).await? {
            Some(recorded) => recorded,
            None => execution,
        };

        if execution.is_terminal() {
            debug!(
                "{} already finished as {}, not running it again",
                execution.name, execution.status
            );
        } else {
            execution.start();
            self.repository.save(&execution).await?;
            debug!("Worker {} started {}", self.name, execution.name);

            match self.runner.run(&step_name, &execution).await {
                Ok(()) => {
                    execution.finish(ExecutionStatus::Completed, None);
                }
                Err(e) => {
                    warn!("{} failed: {}", execution.name, e);
                    execution.finish(ExecutionStatus::Failed, Some(e.to_string()));
                }
            }
            self.repository.save(&execution).await?;
            info!("Worker {} finished {} as {}", self.name, execution.name, execution.status);
        }

        if let Some(aggregator) = &self.aggregator {
            if let Some(reply) = aggregator.offer(&headers, execution.clone()).await {
                self.gateway.reply(headers.reply_to.as_ref(), reply)?;
            }
        }

        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::splitter::{SimpleSplitter, Splitter, PARTITION_KEY};
    use crate::{HandlerConfig, PartitionHandler};
    use shardline_messaging::{ChannelName, MessagingGateway};
    use shardline_storage::{ExecutionStore, InMemoryExecutionStore};

    /// Fails the partitions whose index is listed.
    struct FailPartitions(Vec<u64>);

    #[async_trait]
    impl StepRunner for FailPartitions {
        async fn run(&self, _step_name: &str, execution: &WorkExecution) -> anyhow::Result<()> {
            let index = execution.context.get(PARTITION_KEY).and_then(|v| v.as_u64());
            match index {
                Some(i) if self.0.contains(&i) => Err(anyhow::anyhow!("partition {} failed", i)),
                _ => Ok(()),
            }
        }
    }

    fn spawn_workers(
        count: usize,
        gateway: &Arc<InMemoryGateway>,
        store: &Arc<InMemoryExecutionStore>,
        runner: Arc<dyn StepRunner>,
        aggregator: Option<Arc<ReplyAggregator>>,
    ) -> Vec<tokio::task::JoinHandle<Result<usize>>> {
        (0..count)
            .map(|i| {
                let mut worker = PartitionWorker::new(
                    format!("worker-{}", i),
                    gateway.clone(),
                    store.clone(),
                    runner.clone(),
                );
                if let Some(aggregator) = &aggregator {
                    worker = worker.with_aggregator(aggregator.clone());
                }
                tokio::spawn(async move { worker.run().await })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_process_records_transitions() {
        let gateway = Arc::new(InMemoryGateway::new());
        let store = Arc::new(InMemoryExecutionStore::new());
        let runner = Arc::new(FailPartitions(vec![1]));
        let worker = PartitionWorker::new("w", gateway, store.clone(), runner);

        let parent = WorkExecution::parent("job");
        let children = SimpleSplitter::new().split(&parent, 2).await.unwrap();

        let mut results = Vec::new();
        for (i, child) in children.iter().enumerate() {
            let message = DispatchMessage {
                step_name: "job".to_string(),
                execution: child.clone(),
                headers: shardline_messaging::MessageHeaders {
                    correlation_id: parent.id,
                    sequence_number: i + 1,
                    sequence_size: 2,
                    reply_to: None,
                },
            };
            results.push(worker.process(message).await.unwrap());
        }

        assert_eq!(results[0].status, ExecutionStatus::Completed);
        assert_eq!(results[1].status, ExecutionStatus::Failed);
        assert_eq!(results[1].exit_message.as_deref(), Some("partition 1 failed"));

        let stored = store.lookup(parent.id, children[1].id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.started_at.is_some() && stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_children_are_not_rerun() {
        let gateway = Arc::new(InMemoryGateway::new());
        let store = Arc::new(InMemoryExecutionStore::new());
        let runner = Arc::new(FailPartitions(vec![0]));
        let worker = PartitionWorker::new("w", gateway, store.clone(), runner);

        let parent = WorkExecution::parent("job");
        let mut child = WorkExecution::child(&parent, "partition0").with_context(PARTITION_KEY, 0);
        child.finish(ExecutionStatus::Completed, None);
        store.save(&child).await.unwrap();

        let message = DispatchMessage {
            step_name: "job".to_string(),
            execution: WorkExecution { status: ExecutionStatus::NotStarted, ..child.clone() },
            headers: shardline_messaging::MessageHeaders {
                correlation_id: parent.id,
                sequence_number: 1,
                sequence_size: 1,
                reply_to: None,
            },
        };

        let result = worker.process(message).await.unwrap();
        assert_eq!(result, child);
    }

    #[tokio::test]
    async fn test_end_to_end_reply_mode() {
        let gateway = Arc::new(InMemoryGateway::new());
        let channel = ChannelName::new("partition-replies");
        gateway.declare_channel(channel.clone());
        let store = Arc::new(InMemoryExecutionStore::new());
        let aggregator = Arc::new(ReplyAggregator::new());
        let workers = spawn_workers(
            3,
            &gateway,
            &store,
            Arc::new(FailPartitions(vec![2])),
            Some(aggregator.clone()),
        );

        let config = HandlerConfig::new("job")
            .with_grid_size(4)
            .with_timeout(Duration::from_secs(10))
            .with_reply_channel(channel);
        let handler = PartitionHandler::new(gateway.clone(), config).unwrap();
        let parent = WorkExecution::parent("job");

        let results = handler
            .handle(&SimpleSplitter::new(), &parent)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(WorkExecution::is_terminal));
        assert_eq!(
            results.iter().filter(|e| e.status == ExecutionStatus::Failed).count(),
            1
        );
        assert_eq!(gateway.sent_count(), 4);
        assert_eq!(aggregator.pending_groups().await, 0);

        gateway.close();
        let mut processed = 0;
        for worker in workers {
            processed += worker.await.unwrap().unwrap();
        }
        assert_eq!(processed, 4);
    }

    #[tokio::test]
    async fn test_end_to_end_polling_mode() {
        let gateway = Arc::new(InMemoryGateway::new());
        let store = Arc::new(InMemoryExecutionStore::new());
        let workers = spawn_workers(2, &gateway, &store, Arc::new(FailPartitions(vec![])), None);

        let config = HandlerConfig::new("job")
            .with_grid_size(5)
            .with_poll_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(10));
        let handler = PartitionHandler::new(gateway.clone(), config)
            .unwrap()
            .with_store(store.clone());
        let splitter = SimpleSplitter::new().with_repository(store.clone());
        let parent = WorkExecution::parent("job");

        let results = handler.handle(&splitter, &parent).await.unwrap().unwrap();

        assert_eq!(results.len(), 5);
        assert!(results
            .iter()
            .all(|e| e.status == ExecutionStatus::Completed));
        assert_eq!(gateway.receive_count(), 0);

        gateway.close();
        for worker in workers {
            worker.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test]
    async fn test_reply_goes_to_default_channel_without_reply_to() {
        let gateway = Arc::new(InMemoryGateway::new());
        let store = Arc::new(InMemoryExecutionStore::new());
        let runner = Arc::new(FailPartitions(vec![]));
        let worker = PartitionWorker::new("w", gateway.clone(), store, runner)
            .with_aggregator(Arc::new(ReplyAggregator::new()));

        let parent = WorkExecution::parent("job");
        let message = DispatchMessage {
            step_name: "job".to_string(),
            execution: WorkExecution::child(&parent, "partition0"),
            headers: shardline_messaging::MessageHeaders {
                correlation_id: parent.id,
                sequence_number: 1,
                sequence_size: 1,
                reply_to: None,
            },
        };
        worker.process(message).await.unwrap();

        let reply = gateway
            .receive(None, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.correlation_id, Some(parent.id));
        assert_eq!(reply.executions.len(), 1);
    }
}
