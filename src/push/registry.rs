//! Process-local registry of open live push streams.
//!
//! Every stream owns a bounded queue. Broadcasting never waits: a stream whose
//! queue is full misses the frame, and a stream whose receiver is gone is
//! removed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::infrastructure::metrics::PushMetrics;

pub type Frame = Arc<str>;

struct PushConnection {
    sender: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
    dropped: AtomicU64,
}

/// Outcome of one broadcast across all streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResult {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStats {
    pub connections: usize,
    pub total_registered: u64,
    pub frames_broadcast: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub oldest_connection: Option<DateTime<Utc>>,
}

pub struct PushRegistry {
    connections: DashMap<Uuid, PushConnection>,
    buffer: usize,
    closed: AtomicBool,
    total_registered: AtomicU64,
    frames_broadcast: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
}

impl PushRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
            total_registered: AtomicU64::new(0),
            frames_broadcast: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Add a stream. `None` once the registry has been closed for shutdown.
    pub fn register(&self) -> Option<(Uuid, mpsc::Receiver<Frame>)> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            PushConnection {
                sender: tx,
                connected_at: Utc::now(),
                dropped: AtomicU64::new(0),
            },
        );
        self.total_registered.fetch_add(1, Ordering::Relaxed);
        PushMetrics::record_opened();

        tracing::debug!(connection_id = %id, connections = self.connections.len(), "Push stream registered");
        Some((id, rx))
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        match self.connections.remove(&id) {
            Some((_, connection)) => {
                let lifetime = (Utc::now() - connection.connected_at)
                    .to_std()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();
                PushMetrics::record_closed(lifetime);
                tracing::debug!(
                    connection_id = %id,
                    dropped_frames = connection.dropped.load(Ordering::Relaxed),
                    "Push stream unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn broadcast(&self, frame: &str) -> BroadcastResult {
        let frame: Frame = Arc::from(frame);
        let mut result = BroadcastResult::default();
        let mut gone = Vec::new();

        for entry in self.connections.iter() {
            match entry.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => result.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                    result.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        // Removal happens after iteration; DashMap shards are still read-locked inside it
        for id in gone {
            if self.unregister(id) {
                result.removed += 1;
            }
        }

        self.frames_broadcast.fetch_add(1, Ordering::Relaxed);
        self.frames_delivered
            .fetch_add(result.delivered as u64, Ordering::Relaxed);
        self.frames_dropped
            .fetch_add(result.dropped as u64, Ordering::Relaxed);
        PushMetrics::record_frames(result.delivered, result.dropped);

        if result.dropped > 0 {
            tracing::warn!(dropped = result.dropped, "Push frame dropped for slow streams");
        }
        result
    }

    /// Refuse new streams and end every open one
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<Uuid> = self.connections.iter().map(|entry| *entry.key()).collect();
        let closed = ids.into_iter().filter(|id| self.unregister(*id)).count();
        tracing::info!(closed, "Push streams closed");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn stats(&self) -> PushStats {
        PushStats {
            connections: self.connections.len(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            oldest_connection: self.connections.iter().map(|c| c.connected_at).min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_stream() {
        let registry = PushRegistry::new(4);
        let (_, mut a) = registry.register().unwrap();
        let (_, mut b) = registry.register().unwrap();

        let result = registry.broadcast(r#"{"type":"BookAdded"}"#);
        assert_eq!(result.delivered, 2);
        assert_eq!(&*a.recv().await.unwrap(), r#"{"type":"BookAdded"}"#);
        assert_eq!(&*b.recv().await.unwrap(), r#"{"type":"BookAdded"}"#);
    }

    #[tokio::test]
    async fn test_stalled_stream_loses_frames_without_blocking_others() {
        let registry = PushRegistry::new(1);
        let (_, _stalled) = registry.register().unwrap();
        let (_, mut live) = registry.register().unwrap();

        registry.broadcast("one");
        live.recv().await.unwrap();
        let result = registry.broadcast("two");

        assert_eq!(result.delivered, 1);
        assert_eq!(result.dropped, 1);
        assert_eq!(&*live.recv().await.unwrap(), "two");
        assert_eq!(registry.stats().frames_dropped, 1);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_removed_on_broadcast() {
        let registry = PushRegistry::new(4);
        let (_, rx) = registry.register().unwrap();
        drop(rx);

        let result = registry.broadcast("x");
        assert_eq!(result.removed, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_ends_streams_and_refuses_new_ones() {
        let registry = PushRegistry::new(4);
        let (_, mut rx) = registry.register().unwrap();

        assert_eq!(registry.close_all(), 1);
        assert!(rx.recv().await.is_none());
        assert!(registry.register().is_none());
        assert!(registry.is_closed());
    }

    #[test]
    fn test_unregister_unknown_id() {
        let registry = PushRegistry::new(4);
        assert!(!registry.unregister(Uuid::new_v4()));
    }
}
