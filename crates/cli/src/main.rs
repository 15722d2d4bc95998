//! Shardline CLI - partitioned step execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use shardline_core::{ExecutionStatus, WorkExecution};
use shardline_messaging::{ChannelName, InMemoryGateway, ReplyAggregator};
use shardline_partition::{
    HandlerConfig, PartitionHandler, PartitionWorker, SimpleSplitter, Splitter, StepRunner,
    PARTITION_KEY,
};
use shardline_storage::{
    ExecutionRepository, ExecutionStore, InMemoryExecutionStore, JsonExecutionStore,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardline")]
#[command(about = "Partitioned step execution", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a parent step and run the partitions on in-process workers
    Run {
        #[command(flatten)]
        handler: HandlerArgs,
        /// Completion mode
        #[arg(long, value_enum, default_value = "reply")]
        mode: Mode,
        /// Number of workers
        #[arg(long, default_value = "2")]
        workers: usize,
        /// Simulated work per partition in milliseconds
        #[arg(long, default_value = "50")]
        work_ms: u64,
        /// Keep executions as JSON files under this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,
        /// Partition index that should fail (repeatable)
        #[arg(long = "fail-partition")]
        fail_partitions: Vec<u64>,
    },
    /// Print the partitions a split would produce
    Plan {
        #[command(flatten)]
        handler: HandlerArgs,
    },
}

#[derive(clap::Args)]
struct HandlerArgs {
    /// JSON handler configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Remote step name
    #[arg(long)]
    step_name: Option<String>,
    /// Number of partitions
    #[arg(long)]
    grid_size: Option<usize>,
    /// Delay between polling rounds in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    /// Overall timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Reply channel
    #[arg(long)]
    reply_channel: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Wait for one aggregated reply
    Reply,
    /// Poll the execution store
    Poll,
}

impl HandlerArgs {
    async fn load(self) -> Result<HandlerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                HandlerConfig::from_json_str(&json)?
            }
            None => HandlerConfig::new("demo"),
        };

        if let Some(step_name) = self.step_name {
            config.step_name = step_name;
        }
        if let Some(grid_size) = self.grid_size {
            config = config.with_grid_size(grid_size);
        }
        if let Some(ms) = self.poll_interval_ms {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(channel) = self.reply_channel {
            config = config.with_reply_channel(ChannelName::new(channel));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Sleeps for a fixed time and fails the configured partitions.
struct DemoRunner {
    work: Duration,
    fail_partitions: Vec<u64>,
}

#[async_trait]
impl StepRunner for DemoRunner {
    async fn run(&self, step_name: &str, execution: &WorkExecution) -> anyhow::Result<()> {
        tokio::time::sleep(self.work).await;
        let partition = execution.context.get(PARTITION_KEY).and_then(|v| v.as_u64());
        match partition {
            Some(i) if self.fail_partitions.contains(&i) => {
                anyhow::bail!("{} failed on partition {}", step_name, i)
            }
            _ => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            handler,
            mode,
            workers,
            work_ms,
            store_dir,
            fail_partitions,
        } => {
            let config = handler.load().await?;
            let stores: Stores = match store_dir {
                Some(dir) => {
                    let store = Arc::new(JsonExecutionStore::new(&dir).await?);
                    info!("Keeping executions under {}", store.root().display());
                    as_stores(store)
                }
                None => {
                    let store = Arc::new(InMemoryExecutionStore::new());
                    as_stores(store)
                }
            };
            run(config, mode, workers.max(1), work_ms, stores, fail_partitions).await?;
        }
        Commands::Plan { handler } => {
            let config = handler.load().await?;
            let parent = WorkExecution::parent(config.step_name.clone());
            let children = SimpleSplitter::new()
                .split(&parent, config.grid_size)
                .await?;

            println!("Parent: {} ({})", parent.name, parent.id);
            for child in children {
                println!("  {} | {}", child.id, child.name);
            }
        }
    }

    Ok(())
}

fn as_stores<S: ExecutionRepository + 'static>(store: Arc<S>) -> Stores {
    (
        store.clone() as Arc<dyn ExecutionRepository>,
        store as Arc<dyn ExecutionStore>,
    )
}

/// One backing store seen as the workers' repository and the handler's
/// read-only store.
type Stores = (Arc<dyn ExecutionRepository>, Arc<dyn ExecutionStore>);

async fn run(
    config: HandlerConfig,
    mode: Mode,
    workers: usize,
    work_ms: u64,
    (repository, store): Stores,
    fail_partitions: Vec<u64>,
) -> Result<()> {
    let gateway = Arc::new(InMemoryGateway::new());
    if let Some(channel) = &config.reply_channel {
        gateway.declare_channel(channel.clone());
    }

    let runner: Arc<dyn StepRunner> = Arc::new(DemoRunner {
        work: Duration::from_millis(work_ms),
        fail_partitions,
    });
    let aggregator = Arc::new(ReplyAggregator::new());
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let mut worker = PartitionWorker::new(
                format!("worker-{}", i),
                gateway.clone(),
                repository.clone(),
                runner.clone(),
            );
            if matches!(mode, Mode::Reply) {
                worker = worker.with_aggregator(aggregator.clone());
            }
            tokio::spawn(async move { worker.run().await })
        })
        .collect();

    let mut handler = PartitionHandler::new(gateway.clone(), config.clone())?;
    let mut splitter = SimpleSplitter::new();
    if matches!(mode, Mode::Poll) {
        handler = handler.with_store(store);
        splitter = splitter.with_repository(repository.clone());
    }

    let parent = WorkExecution::parent(config.step_name.clone());
    info!(
        "Running {} with {} partition(s) on {} worker(s)",
        parent.name, config.grid_size, workers
    );
    let outcome = handler.handle(&splitter, &parent).await;

    gateway.close();
    for handle in handles {
        if let Err(e) = handle.await? {
            warn!("Worker stopped with error: {}", e);
        }
    }

    let Some(results) = outcome? else {
        println!("Nothing to do for {}", parent.name);
        return Ok(());
    };

    println!("Results for {} ({})", parent.name, parent.id);
    for execution in &results {
        match &execution.exit_message {
            Some(message) => println!("  {} | {} | {}", execution.name, execution.status, message),
            None => println!("  {} | {}", execution.name, execution.status),
        }
    }
    let failed = results
        .iter()
        .filter(|e| e.status != ExecutionStatus::Completed)
        .count();
    println!("{}/{} completed", results.len() - failed, results.len());
    Ok(())
}
