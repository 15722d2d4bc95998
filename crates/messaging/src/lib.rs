//! Messaging between the partition handler and remote workers.
//!
//! Envelopes, the gateway seam, an in-process gateway and the reply
//! aggregator used by workers in reply mode.

#![warn(missing_docs)]

pub mod aggregator;
pub mod gateway;
pub mod memory;
pub mod message;

pub use aggregator::ReplyAggregator;
pub use gateway::{GatewayError, MessagingGateway, Result};
pub use memory::InMemoryGateway;
pub use message::{ChannelName, DispatchMessage, MessageHeaders, ReplyMessage};
