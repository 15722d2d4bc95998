//! In-process gateway built on tokio channels.
//!
//! Dispatches go to a single request queue shared by every worker; replies go
//! to named channels that must be declared up front (the default reply
//! channel always exists).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::gateway::{GatewayError, MessagingGateway, Result};
use crate::message::{ChannelName, DispatchMessage, ReplyMessage};

struct ReplyQueue {
    tx: mpsc::UnboundedSender<ReplyMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<ReplyMessage>>,
}

impl ReplyQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// Messaging gateway for a single process.
pub struct InMemoryGateway {
    requests_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<DispatchMessage>>>,
    requests_rx: Mutex<mpsc::UnboundedReceiver<DispatchMessage>>,
    default_channel: ChannelName,
    channels: std::sync::Mutex<HashMap<ChannelName, Arc<ReplyQueue>>>,
    sent: AtomicUsize,
    receives: AtomicUsize,
}

impl InMemoryGateway {
    /// Create a gateway whose default reply channel is `"replies"`.
    pub fn new() -> Self {
        Self::with_default_channel(ChannelName::default_replies())
    }

    /// Create a gateway with a custom default reply channel.
    pub fn with_default_channel(default_channel: ChannelName) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let mut channels = HashMap::new();
        channels.insert(default_channel.clone(), Arc::new(ReplyQueue::new()));
        Self {
            requests_tx: std::sync::Mutex::new(Some(requests_tx)),
            requests_rx: Mutex::new(requests_rx),
            default_channel,
            channels: std::sync::Mutex::new(channels),
            sent: AtomicUsize::new(0),
            receives: AtomicUsize::new(0),
        }
    }

    /// Declare an additional reply channel. Declaring twice is a no-op.
    pub fn declare_channel(&self, name: ChannelName) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(name)
            .or_insert_with(|| Arc::new(ReplyQueue::new()));
    }

    /// The default reply channel.
    pub fn default_channel(&self) -> &ChannelName {
        &self.default_channel
    }

    fn queue(&self, channel: Option<&ChannelName>) -> Result<Arc<ReplyQueue>> {
        let name = channel.unwrap_or(&self.default_channel);
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownChannel(name.clone()))
    }

    /// Wait for the next dispatch. Returns `None` once the gateway is closed
    /// and every pending dispatch was taken.
    pub async fn next_request(&self) -> Option<DispatchMessage> {
        self.requests_rx.lock().await.recv().await
    }

    /// Take a pending dispatch without waiting.
    pub async fn try_next_request(&self) -> Option<DispatchMessage> {
        self.requests_rx.lock().await.try_recv().ok()
    }

    /// Publish a reply on `channel` (or the default reply channel).
    pub fn reply(&self, channel: Option<&ChannelName>, message: ReplyMessage) -> Result<()> {
        let queue = self.queue(channel)?;
        queue
            .tx
            .send(message)
            .map_err(|_| GatewayError::Closed(channel.unwrap_or(&self.default_channel).to_string()))
    }

    /// Stop accepting dispatches. Workers drain what is already queued.
    pub fn close(&self) {
        let mut requests_tx = self.requests_tx.lock().unwrap_or_else(|e| e.into_inner());
        if requests_tx.take().is_some() {
            debug!("Request queue closed");
        }
    }

    /// Number of dispatches accepted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Number of receive calls made so far.
    pub fn receive_count(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingGateway for InMemoryGateway {
    async fn send(&self, message: DispatchMessage) -> Result<()> {
        debug!(
            "Dispatching {} ({}/{}) to step {}",
            message.execution.name,
            message.headers.sequence_number,
            message.headers.sequence_size,
            message.step_name
        );
        {
            let requests_tx = self.requests_tx.lock().unwrap_or_else(|e| e.into_inner());
            let Some(tx) = requests_tx.as_ref() else {
                return Err(GatewayError::Closed("requests".to_string()));
            };
            tx.send(message)
                .map_err(|_| GatewayError::Closed("requests".to_string()))?;
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(
        &self,
        channel: Option<&ChannelName>,
        timeout: Duration,
    ) -> Result<Option<ReplyMessage>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        let queue = self.queue(channel)?;

        let received = tokio::time::timeout(timeout, async {
            queue.rx.lock().await.recv().await
        })
        .await;

        match received {
            Ok(Some(message)) => Ok(Some(message)),
            // The queue owns its sender, so this only happens if it was torn down.
            Ok(None) => Err(GatewayError::Closed(
                channel.unwrap_or(&self.default_channel).to_string(),
            )),
            Err(_) => Ok(None),
        }
    }
}
