//! Partitioned step execution.
//!
//! A [`PartitionHandler`] splits a parent execution into children with a
//! [`Splitter`], sends one dispatch per child through a messaging gateway and
//! waits for the outcome with a [`CompletionStrategy`]: a single aggregated
//! reply, or polling an execution store until every child is terminal.
//! [`PartitionWorker`] is the in-process remote side.

#![warn(missing_docs)]

pub mod completion;
pub mod config;
pub mod error;
pub mod handler;
pub mod splitter;
pub mod tracker;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use completion::{CompletionMode, CompletionStrategy, PollingCompletion, ReplyCompletion};
pub use config::{HandlerConfig, MIN_POLL_INTERVAL};
pub use error::{PartitionError, Result};
pub use handler::PartitionHandler;
pub use splitter::{SimpleSplitter, Splitter, PARTITION_COUNT_KEY, PARTITION_KEY};
pub use tracker::CompletionTracker;
pub use worker::{PartitionWorker, StepRunner};
