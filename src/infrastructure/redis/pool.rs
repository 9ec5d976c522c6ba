//! Shared Redis client for publishing.
//!
//! Publishing goes through one multiplexed connection guarded by the circuit
//! breaker. Subscriptions open their own dedicated pub/sub connections from
//! [`RedisPool::client`].

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use super::{CircuitBreaker, RedisHealth};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: Arc<CircuitBreaker>,
    health: Arc<RedisHealth>,
}

impl RedisPool {
    pub fn new(url: &str) -> Result<Self, PoolError> {
        Ok(Self {
            client: Client::open(url)?,
            connection: RwLock::new(None),
            circuit_breaker: Arc::new(CircuitBreaker::new()),
            health: Arc::new(RedisHealth::new()),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn health(&self) -> &Arc<RedisHealth> {
        &self.health
    }

    async fn connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *slot = Some(conn.clone());
                tracing::info!("Redis publish connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Drop the cached connection so the next call reconnects
    async fn invalidate(&self) {
        *self.connection.write().await = None;
    }

    /// PUBLISH `payload` on `channel`, returning the number of receivers
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<u32, PoolError> {
        let mut conn = self.connection().await?;
        match conn.publish::<_, _, u32>(channel, payload).await {
            Ok(receivers) => {
                self.circuit_breaker.record_success();
                Ok(receivers)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                if e.is_io_error() || e.is_connection_dropped() {
                    self.invalidate().await;
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        let mut conn = self.connection().await?;
        let result: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => {
                self.circuit_breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                self.invalidate().await;
                Err(PoolError::Redis(e))
            }
        }
    }
}
