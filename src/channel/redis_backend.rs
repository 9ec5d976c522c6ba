//! Redis pub/sub message channel.
//!
//! Publishing goes through the shared [`RedisPool`]. Each subscription owns a
//! dedicated pub/sub connection; a forwarding task pumps its messages into an
//! mpsc and reconnects with backoff if the connection drops.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::PubSub;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ChannelError, MessageChannel, MessageStream, Topic};
use crate::infrastructure::redis::{ExponentialBackoff, PoolError, RedisPool};

const FORWARD_BUFFER: usize = 256;

pub struct RedisChannel {
    pool: Arc<RedisPool>,
}

impl RedisChannel {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    async fn open(&self, topic: Topic) -> Result<PubSub, redis::RedisError> {
        open_pubsub(&self.pool, topic).await
    }
}

async fn open_pubsub(pool: &RedisPool, topic: Topic) -> Result<PubSub, redis::RedisError> {
    let mut pubsub = pool.client().get_async_pubsub().await?;
    pubsub.subscribe(topic.as_str()).await?;
    Ok(pubsub)
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn publish(&self, topic: Topic, payload: &str) -> Result<(), ChannelError> {
        match self.pool.publish(topic.as_str(), payload).await {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, receivers, "Published to Redis");
                Ok(())
            }
            Err(PoolError::CircuitOpen) => Err(ChannelError::Unavailable(
                "Redis circuit breaker is open".into(),
            )),
            Err(PoolError::Redis(e)) => Err(ChannelError::Redis(e)),
        }
    }

    async fn subscribe(&self, topic: Topic) -> Result<MessageStream, ChannelError> {
        let pubsub = self.open(topic).await?;
        self.pool.health().set_connected();
        tracing::info!(topic = %topic, "Redis subscription established");

        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        tokio::spawn(forward(Arc::clone(&self.pool), topic, pubsub, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Pump messages until the receiving side goes away, reconnecting on loss.
/// Anything published while disconnected is gone.
async fn forward(pool: Arc<RedisPool>, topic: Topic, first: PubSub, tx: mpsc::Sender<String>) {
    let mut backoff = ExponentialBackoff::new();
    let mut current = Some(first);

    loop {
        let pubsub = match current.take() {
            Some(pubsub) => pubsub,
            None => {
                let delay = backoff.next_delay();
                pool.health().set_reconnecting();
                tracing::warn!(
                    topic = %topic,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Redis subscription lost, reconnecting"
                );
                tokio::select! {
                    _ = tx.closed() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                match open_pubsub(&pool, topic).await {
                    Ok(pubsub) => {
                        pool.health().set_connected();
                        backoff.reset();
                        tracing::info!(topic = %topic, "Redis subscription re-established");
                        pubsub
                    }
                    Err(e) => {
                        tracing::error!(topic = %topic, error = %e, "Redis resubscribe failed");
                        continue;
                    }
                }
            }
        };

        let mut messages = Box::pin(pubsub.into_on_message());
        loop {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!(topic = %topic, "Subscriber gone, closing Redis subscription");
                    return;
                }
                msg = messages.next() => match msg {
                    Some(msg) => {
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::warn!(topic = %topic, error = %e, "Unreadable Redis payload");
                                continue;
                            }
                        };
                        if tx.send(payload).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_broker_fails_locally() {
        let pool = Arc::new(RedisPool::new("redis://127.0.0.1:1").unwrap());
        let channel = RedisChannel::new(pool);

        assert!(channel.publish(Topic::BookAdded, "{}").await.is_err());
        assert!(channel.subscribe(Topic::BookAdded).await.is_err());
        assert_eq!(channel.backend(), "redis");
    }
}
