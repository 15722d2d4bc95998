//! Messaging gateway abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::message::{ChannelName, DispatchMessage, ReplyMessage};

/// Error type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while sending or receiving.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The channel no longer accepts messages
    #[error("channel closed: {0}")]
    Closed(String),

    /// No channel with that name was declared
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelName),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Transport between the partition handler and remote workers.
///
/// Delivery guarantees are the gateway's concern; the handler treats `send`
/// as fire-and-forget.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a dispatch to the workers.
    async fn send(&self, message: DispatchMessage) -> Result<()>;

    /// Wait up to `timeout` for a reply on `channel`, or on the gateway's
    /// default reply channel when `channel` is `None`. Returns `Ok(None)` when
    /// nothing arrived in time.
    async fn receive(
        &self,
        channel: Option<&ChannelName>,
        timeout: Duration,
    ) -> Result<Option<ReplyMessage>>;
}
