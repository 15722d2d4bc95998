//! Execution store abstraction and implementations for Shardline.
//!
//! This crate provides a trait-based store interface with an in-memory and a
//! JSON file implementation.

#![warn(missing_docs)]

pub mod json_storage;
pub mod memory;
pub mod trait_;

pub use json_storage::JsonExecutionStore;
pub use memory::InMemoryExecutionStore;
pub use trait_::{ExecutionRepository, ExecutionStore, Result, StorageError};
