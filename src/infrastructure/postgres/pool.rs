//! PostgreSQL connection pool with circuit breaker integration.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::infrastructure::config::DatabaseConfig;
use crate::infrastructure::redis::CircuitBreaker;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("database.url is not configured")]
    MissingUrl,
}

/// Pool shared by the subscription, notification and catalog stores.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
    masked_url: String,
}

impl PostgresPool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PostgresPoolError> {
        let url = config.url.as_deref().ok_or(PostgresPoolError::MissingUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(url)
            .await?;

        let masked_url = mask_url(url);
        tracing::info!(
            url = %masked_url,
            pool_size = config.pool_size,
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            pool,
            circuit_breaker: Arc::new(CircuitBreaker::new()),
            masked_url,
        })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), PostgresPoolError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("PostgreSQL schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.allow_request()
    }

    pub fn url_masked(&self) -> &str {
        &self.masked_url
    }

    /// Run `operation` unless the breaker is open, recording its outcome.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, PostgresPoolError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(PostgresPoolError::CircuitOpen);
        }

        match operation(self.pool.clone()).await {
            Ok(value) => {
                self.circuit_breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                // Constraint violations are caller errors, not an unhealthy database
                if !matches!(e, sqlx::Error::Database(_) | sqlx::Error::RowNotFound) {
                    self.circuit_breaker.record_failure();
                }
                Err(PostgresPoolError::Sqlx(e))
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

fn mask_url(url: &str) -> String {
    if let Some(at) = url.find('@') {
        if let Some(colon) = url[..at].rfind(':') {
            if !url[..colon].ends_with('/') {
                return format!("{}***{}", &url[..colon + 1], &url[at..]);
            }
        }
    }
    url.to_string()
}
