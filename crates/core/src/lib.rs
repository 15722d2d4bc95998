//! Shardline core data models.
//!
//! This crate defines the work execution entity that is split, dispatched
//! and aggregated by the partition handler.

#![warn(missing_docs)]

// Core identities
mod id;

// Executions
mod execution;

// Re-exports
pub use execution::{ExecutionContext, ExecutionStatus, WorkExecution};
pub use id::ExecutionId;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
