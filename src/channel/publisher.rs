//! Producer side of the channel: commit locally, then publish best-effort.

use std::sync::Arc;
use std::time::Duration;

use super::{DomainEvent, MessageChannel};
use crate::infrastructure::metrics::ChannelMetrics;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishing never fails the caller. Without a channel every publish is a
/// logged no-op.
#[derive(Clone)]
pub struct EventPublisher {
    channel: Option<Arc<dyn MessageChannel>>,
}

impl EventPublisher {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    pub fn disabled() -> Self {
        Self { channel: None }
    }

    /// Returns whether the broker accepted the message
    pub async fn publish(&self, event: &DomainEvent) -> bool {
        let topic = event.topic();

        let Some(channel) = &self.channel else {
            tracing::debug!(topic = %topic, "No message channel configured, event not published");
            return false;
        };

        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to encode event");
                ChannelMetrics::record_published(topic.as_str(), false);
                return false;
            }
        };

        let ok = match tokio::time::timeout(PUBLISH_TIMEOUT, channel.publish(topic, &payload)).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(topic = %topic, error = %e, "Publish failed, event lost");
                false
            }
            Err(_) => {
                tracing::warn!(topic = %topic, "Publish timed out, event lost");
                false
            }
        };
        ChannelMetrics::record_published(topic.as_str(), ok);
        ok
    }

    /// Run the producer's local `commit`; on success publish the event built
    /// from its result. The commit's result is returned unchanged whatever
    /// happens to the publish.
    pub async fn commit_then_publish<T, E, C, Fut, B>(&self, commit: C, build: B) -> Result<T, E>
    where
        C: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        B: FnOnce(&T) -> DomainEvent,
    {
        let committed = commit().await?;
        let event = build(&committed);
        self.publish(&event).await;
        Ok(committed)
    }
}
