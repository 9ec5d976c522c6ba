use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub projector: ProjectorConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Required in `X-API-Key` for mutating routes when set
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// When false the service runs on the in-process channel only
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "memory" (default) or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Bounded input queue per channel subscription
    #[serde(default = "default_consumer_queue")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectorConfig {
    /// Number of per-key workers; a book id always maps to the same one
    #[serde(default = "default_projector_shards")]
    pub shards: usize,
    #[serde(default = "default_projector_queue")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// SSE keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_interval: u64,
    /// Frames buffered per client before frames are dropped for it
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,
    /// Expired-notification purge interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    #[serde(default = "default_max_concurrent_emails")]
    pub max_concurrent_emails: usize,
    /// Fan-out audit entries kept in memory
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_email_from")]
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_consumer_queue() -> usize {
    256
}

fn default_projector_shards() -> usize {
    8
}

fn default_projector_queue() -> usize {
    128
}

fn default_keep_alive() -> u64 {
    15
}

fn default_connection_buffer() -> usize {
    64
}

fn default_expiry_days() -> i64 {
    30
}

fn default_cleanup_interval() -> u64 {
    3600 // 1 hour
}

fn default_max_concurrent_emails() -> usize {
    16
}

fn default_audit_capacity() -> usize {
    500
}

fn default_email_from() -> String {
    "no-reply@shelf.local".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "shelf-notification-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("storage.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, REDIS__URL, DATABASE__URL, NOTIFICATION__EXPIRY_DAYS, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            consumer: ConsumerConfig::default(),
            projector: ProjectorConfig::default(),
            push: PushConfig::default(),
            notification: NotificationConfig::default(),
            email: EmailConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_redis_url(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_consumer_queue(),
        }
    }
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            shards: default_projector_shards(),
            queue_capacity: default_projector_queue(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: default_keep_alive(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_expiry_days(),
            cleanup_interval: default_cleanup_interval(),
            max_concurrent_emails: default_max_concurrent_emails(),
            audit_capacity: default_audit_capacity(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from: default_email_from(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);
    }

    #[test]
    fn test_default_settings_run_without_infrastructure() {
        let settings = Settings::default();
        assert_eq!(settings.storage.backend, "memory");
        assert!(settings.database.url.is_none());
        assert!(!settings.email.enabled);
        assert_eq!(settings.projector.shards, 8);
        assert_eq!(settings.notification.expiry_days, 30);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let settings: Settings = Config::builder()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("redis.enabled", false)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert!(!settings.redis.enabled);
        assert_eq!(settings.redis.url, "redis://localhost:6379");
        assert_eq!(settings.consumer.queue_capacity, 256);
    }
}
