//! Keyed executor: jobs sharing a key run one at a time, in submission order.
//!
//! Keys are hashed onto a fixed set of worker tasks, each draining a bounded
//! queue. Submitting waits for queue space instead of dropping.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::panic_message;

pub type Job = BoxFuture<'static, ()>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Executor is shut down")]
    Closed,
}

pub struct KeyedExecutor {
    name: &'static str,
    senders: Mutex<Vec<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shards: usize,
}

impl KeyedExecutor {
    pub fn new(name: &'static str, shards: usize, queue_capacity: usize) -> Self {
        let shards = shards.max(1);
        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel::<Job>(queue_capacity.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_shard(name, shard, rx)));
        }

        tracing::info!(executor = name, shards, "Keyed executor started");

        Self {
            name,
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
            shards,
        }
    }

    pub fn shards(&self) -> usize {
        self.shards
    }

    pub fn shard_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }

    pub async fn submit(&self, key: &str, job: Job) -> Result<(), ExecutorError> {
        let shard = self.shard_for(key);
        let sender = self
            .senders
            .lock()
            .map_err(|_| ExecutorError::Closed)?
            .get(shard)
            .cloned()
            .ok_or(ExecutorError::Closed)?;

        sender.send(job).await.map_err(|_| ExecutorError::Closed)
    }

    /// Stop accepting jobs and wait until every queued job has run
    pub async fn shutdown(&self) {
        let workers = {
            if let Ok(mut senders) = self.senders.lock() {
                senders.clear();
            }
            match self.workers.lock() {
                Ok(mut workers) => std::mem::take(&mut *workers),
                Err(_) => Vec::new(),
            }
        };

        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!(executor = self.name, "Keyed executor drained");
    }
}

async fn run_shard(name: &'static str, shard: usize, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        if let Err(panic) = std::panic::AssertUnwindSafe(job).catch_unwind().await {
            tracing::error!(
                executor = name,
                shard,
                panic = %panic_message(&*panic),
                "Keyed job panicked"
            );
        }
    }
    tracing::debug!(executor = name, shard, "Executor shard stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let executor = KeyedExecutor::new("test", 4, 16);
        let seen = Arc::new(AsyncMutex::new(Vec::new()));

        for i in 0..10u64 {
            let seen = seen.clone();
            executor
                .submit(
                    "book-1",
                    async move {
                        // Later jobs sleep less; order must still hold
                        tokio::time::sleep(Duration::from_millis(10 - i)).await;
                        seen.lock().await.push(i);
                    }
                    .boxed(),
                )
                .await
                .unwrap();
        }
        executor.shutdown().await;

        assert_eq!(*seen.lock().await, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_key_maps_to_stable_shard() {
        let executor = KeyedExecutor::new("test", 8, 4);
        assert_eq!(executor.shard_for("b-42"), executor.shard_for("b-42"));
        assert!(executor.shard_for("b-42") < executor.shards());
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_shard() {
        let executor = KeyedExecutor::new("test", 1, 4);
        let ran = Arc::new(AsyncMutex::new(false));

        executor
            .submit("k", async { panic!("boom") }.boxed())
            .await
            .unwrap();
        let flag = ran.clone();
        executor
            .submit("k", async move { *flag.lock().await = true }.boxed())
            .await
            .unwrap();
        executor.shutdown().await;

        assert!(*ran.lock().await);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let executor = KeyedExecutor::new("test", 2, 4);
        executor.shutdown().await;
        let result = executor.submit("k", async {}.boxed()).await;
        assert_eq!(result, Err(ExecutorError::Closed));
    }
}
