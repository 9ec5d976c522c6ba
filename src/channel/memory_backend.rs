//! In-process message channel backed by `tokio::sync::broadcast`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::{ChannelError, MessageChannel, MessageStream, Topic};

const DEFAULT_CAPACITY: usize = 1024;

/// Same at-most-once contract as the Redis backend: no subscriber, no delivery.
pub struct MemoryChannel {
    topics: DashMap<Topic, broadcast::Sender<Arc<str>>>,
    capacity: usize,
    available: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the broker going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), ChannelError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ChannelError::Unavailable("in-memory channel disabled".into()))
        }
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<Arc<str>> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn publish(&self, topic: Topic, payload: &str) -> Result<(), ChannelError> {
        self.ensure_available()?;
        // No receivers is not an error: the message is simply lost
        let _ = self.sender(topic).send(Arc::from(payload));
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<MessageStream, ChannelError> {
        self.ensure_available()?;
        let rx = self.sender(topic).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |item| async move {
            match item {
                Ok(payload) => Some(payload.to_string()),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %topic, skipped, "In-memory subscriber lagged, messages lost");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
