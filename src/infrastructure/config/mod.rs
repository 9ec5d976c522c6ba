mod settings;

pub use settings::{
    ApiConfig, ConsumerConfig, DatabaseConfig, EmailConfig, NotificationConfig, OtelConfig,
    ProjectorConfig, PushConfig, RedisConfig, ServerConfig, Settings, StorageConfig,
};
