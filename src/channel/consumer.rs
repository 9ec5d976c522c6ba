//! One consumer task pair per (topic, handler) subscription.
//!
//! ```text
//! broker ──► reader ──try_send──► [bounded queue] ──► worker ──► handler.handle()
//!              │                                         └──► panic / error: logged, event dropped
//!              └── queue full: event dropped for this consumer only
//! ```
//!
//! The reader never waits on the handler, so a slow handler loses events
//! instead of stalling the broker connection. Events reach the handler in
//! broker order. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{MessageChannel, ReceivedEvent, Topic};
use crate::infrastructure::metrics::ChannelMetrics;
use crate::infrastructure::redis::ExponentialBackoff;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// A store or downstream collaborator failed
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// The event was well-formed but cannot be applied
    #[error("Event rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError>;
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatsSnapshot {
    pub consumer: &'static str,
    pub topic: Topic,
    pub received: u64,
    pub handled: u64,
    pub failed: u64,
    pub rejected: u64,
    pub dropped: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self, consumer: &'static str, topic: Topic) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            consumer,
            topic,
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct ChannelConsumer {
    topic: Topic,
    handler: Arc<dyn EventHandler>,
    channel: Arc<dyn MessageChannel>,
    queue_capacity: usize,
}

/// Running consumer; dropping it does not stop the tasks, use the shutdown signal
pub struct ConsumerHandle {
    name: &'static str,
    topic: Topic,
    stats: Arc<ConsumerStats>,
    reader: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot(self.name, self.topic)
    }

    pub fn stats_ref(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the reader to stop and the worker to drain its queue
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.worker.await;
    }
}

impl ChannelConsumer {
    pub fn new(
        topic: Topic,
        handler: Arc<dyn EventHandler>,
        channel: Arc<dyn MessageChannel>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            topic,
            handler,
            channel,
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> ConsumerHandle {
        let name = self.handler.name();
        let stats = Arc::new(ConsumerStats::default());
        let (tx, rx) = mpsc::channel::<String>(self.queue_capacity);

        let reader = tokio::spawn(read_loop(
            self.topic,
            name,
            self.channel,
            tx,
            Arc::clone(&stats),
            shutdown,
        ));
        let worker = tokio::spawn(work_loop(
            self.topic,
            self.handler,
            rx,
            Arc::clone(&stats),
        ));

        tracing::info!(consumer = name, topic = %self.topic, "Channel consumer started");

        ConsumerHandle {
            name,
            topic: self.topic,
            stats,
            reader,
            worker,
        }
    }
}

async fn read_loop(
    topic: Topic,
    name: &'static str,
    channel: Arc<dyn MessageChannel>,
    tx: mpsc::Sender<String>,
    stats: Arc<ConsumerStats>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut backoff = ExponentialBackoff::new();

    'subscribe: loop {
        let mut stream = match channel.subscribe(topic).await {
            Ok(stream) => {
                backoff.reset();
                stream
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    consumer = name,
                    topic = %topic,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Subscribe failed, running without this consumer until it succeeds"
                );
                tokio::select! {
                    _ = shutdown.recv() => break 'subscribe,
                    _ = tokio::time::sleep(delay) => continue 'subscribe,
                }
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.recv() => break 'subscribe,
                next = stream.next() => match next {
                    Some(payload) => {
                        stats.received.fetch_add(1, Ordering::Relaxed);
                        ChannelMetrics::record_received(topic.as_str());

                        match tx.try_send(payload) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                stats.dropped.fetch_add(1, Ordering::Relaxed);
                                ChannelMetrics::record_dropped(name, "queue_full");
                                tracing::warn!(consumer = name, topic = %topic, "Consumer queue full, event dropped");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                ChannelMetrics::record_dropped(name, "closed");
                                break 'subscribe;
                            }
                        }
                    }
                    None => {
                        tracing::warn!(consumer = name, topic = %topic, "Channel stream ended, resubscribing");
                        continue 'subscribe;
                    }
                }
            }
        }
    }

    tracing::debug!(consumer = name, topic = %topic, "Consumer reader stopped");
}

async fn work_loop(
    topic: Topic,
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::Receiver<String>,
    stats: Arc<ConsumerStats>,
) {
    let name = handler.name();

    while let Some(payload) = rx.recv().await {
        let event = match ReceivedEvent::decode(topic, &payload) {
            Ok(event) => event,
            Err(e) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                ChannelMetrics::record_rejected(topic.as_str());
                tracing::warn!(
                    consumer = name,
                    topic = %topic,
                    error = %e,
                    payload = %payload,
                    "Malformed event dropped"
                );
                continue;
            }
        };

        let outcome = std::panic::AssertUnwindSafe(handler.handle(&event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                stats.handled.fetch_add(1, Ordering::Relaxed);
                ChannelMetrics::record_handled(name);
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                ChannelMetrics::record_failed(name);
                tracing::error!(consumer = name, topic = %topic, error = %e, "Event handler failed, event dropped");
            }
            Err(panic) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                ChannelMetrics::record_failed(name);
                tracing::error!(
                    consumer = name,
                    topic = %topic,
                    panic = %panic_message(&*panic),
                    "Event handler panicked, event dropped"
                );
            }
        }
    }

    tracing::debug!(consumer = name, topic = %topic, "Consumer worker drained");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DomainEvent, MemoryChannel};
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
        panic_on: Option<String>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_on: None,
                panic_on: None,
            }
        }
    }

    #[async_trait]
    impl EventHandler for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
            let id = match &event.event {
                DomainEvent::UserDeleted(e) => e.user_id.clone(),
                other => panic!("unexpected {:?}", other),
            };
            if self.panic_on.as_deref() == Some(id.as_str()) {
                panic!("boom");
            }
            if self.fail_on.as_deref() == Some(id.as_str()) {
                return Err(HandlerError::Infrastructure("store down".into()));
            }
            self.seen.lock().await.push(id);
            Ok(())
        }
    }

    fn user_deleted(user_id: &str) -> String {
        format!(
            r#"{{"userId":"{}","username":"u","email":"u@x.io","deletedBy":"admin","timestamp":"2026-10-18T00:00:00Z"}}"#,
            user_id
        )
    }

    async fn settle(handle: &ConsumerHandle, expected_received: u64) {
        for _ in 0..100 {
            let stats = handle.stats();
            if stats.received >= expected_received
                && stats.handled + stats.failed + stats.rejected + stats.dropped >= expected_received
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_subscription(channel: &MemoryChannel, topic: Topic) {
        for _ in 0..100 {
            if channel.subscriber_count(topic) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_failures_and_panics_do_not_stop_consumer() {
        let channel = Arc::new(MemoryChannel::new());
        let handler = Arc::new(Recording {
            fail_on: Some("u-2".into()),
            panic_on: Some("u-3".into()),
            ..Recording::new()
        });
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = ChannelConsumer::new(
            Topic::UserDeleted,
            handler.clone(),
            channel.clone(),
            16,
        )
        .spawn(shutdown_tx.subscribe());
        wait_for_subscription(&channel, Topic::UserDeleted).await;

        for id in ["u-1", "u-2", "u-3", "u-4"] {
            channel
                .publish(Topic::UserDeleted, &user_deleted(id))
                .await
                .unwrap();
        }
        channel.publish(Topic::UserDeleted, "{bad json").await.unwrap();
        settle(&handle, 5).await;

        assert_eq!(*handler.seen.lock().await, vec!["u-1", "u-4"]);
        let stats = handle.stats();
        assert_eq!(stats.handled, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.rejected, 1);

        let _ = shutdown_tx.send(());
        handle.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_reader() {
        let channel = Arc::new(MemoryChannel::new());
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = ChannelConsumer::new(
            Topic::UserDeleted,
            Arc::new(Recording::new()),
            channel.clone(),
            4,
        )
        .spawn(shutdown_tx.subscribe());
        wait_for_subscription(&channel, Topic::UserDeleted).await;

        let _ = shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("consumer did not stop");
        assert_eq!(channel.subscriber_count(Topic::UserDeleted), 0);
    }

    #[tokio::test]
    async fn test_subscribe_retries_while_channel_unavailable() {
        let channel = Arc::new(MemoryChannel::new());
        channel.set_available(false);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handler = Arc::new(Recording::new());

        let handle = ChannelConsumer::new(
            Topic::UserDeleted,
            handler.clone(),
            channel.clone(),
            4,
        )
        .spawn(shutdown_tx.subscribe());

        channel.set_available(true);
        wait_for_subscription(&channel, Topic::UserDeleted).await;
        channel
            .publish(Topic::UserDeleted, &user_deleted("u-9"))
            .await
            .unwrap();
        settle(&handle, 1).await;
        assert_eq!(*handler.seen.lock().await, vec!["u-9"]);

        let _ = shutdown_tx.send(());
        handle.join().await;
    }
}
