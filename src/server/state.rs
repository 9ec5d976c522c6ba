use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::catalog::{CatalogClient, MemoryCatalog, PostgresCatalog};
use crate::channel::{create_message_channel, EventPublisher, MessageChannel};
use crate::consumers::{ConsumerDeps, ConsumerSet};
use crate::email::{EmailSender, LogEmailSender};
use crate::infrastructure::config::Settings;
use crate::infrastructure::postgres::PostgresPool;
use crate::infrastructure::redis::RedisPool;
use crate::notification::{
    AuditLog, MemoryNotificationStore, NotificationFanout, NotificationStore,
    PostgresNotificationStore,
};
use crate::projector::AvailabilityProjector;
use crate::push::PushRegistry;
use crate::subscription::{MemorySubscriptionStore, PostgresSubscriptionStore, SubscriptionStore};
use crate::targeting::TargetingResolver;

/// Collaborators the service runs on
pub struct Backends {
    pub channel: Arc<dyn MessageChannel>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub catalog: Arc<dyn CatalogClient>,
    pub email: Arc<dyn EmailSender>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub postgres_pool: Option<PostgresPool>,
}

impl Backends {
    /// In-process channel, memory stores and the log email sink
    pub fn memory(settings: &Settings) -> Self {
        Self {
            channel: Arc::new(crate::channel::MemoryChannel::new()),
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
            catalog: Arc::new(MemoryCatalog::new()),
            email: Arc::new(LogEmailSender::new(
                settings.email.from.clone(),
                settings.email.enabled,
            )),
            redis_pool: None,
            postgres_pool: None,
        }
    }

    /// Backends selected by configuration. Unreachable infrastructure falls
    /// back to the in-process equivalent instead of failing startup.
    pub async fn from_settings(settings: &Settings) -> Self {
        let mut backends = Self::memory(settings);

        if settings.redis.enabled {
            match RedisPool::new(&settings.redis.url) {
                Ok(pool) => backends.redis_pool = Some(Arc::new(pool)),
                Err(e) => tracing::error!(error = %e, "Invalid Redis configuration"),
            }
        }
        backends.channel = create_message_channel(&settings.redis, backends.redis_pool.clone());

        match settings.storage.backend.as_str() {
            "postgres" => match Self::connect_postgres(settings).await {
                Some(pool) => {
                    backends.subscriptions = Arc::new(PostgresSubscriptionStore::new(pool.clone()));
                    backends.notifications = Arc::new(PostgresNotificationStore::new(pool.clone()));
                    backends.catalog = Arc::new(PostgresCatalog::new(pool.clone()));
                    backends.postgres_pool = Some(pool);
                }
                None => tracing::warn!("Falling back to in-memory storage"),
            },
            "memory" => {}
            other => tracing::warn!(backend = other, "Unknown storage backend, using memory"),
        }

        tracing::info!(
            channel = backends.channel.backend(),
            subscriptions = backends.subscriptions.backend(),
            notifications = backends.notifications.backend(),
            catalog = backends.catalog.backend(),
            email = backends.email.name(),
            "Backends selected"
        );
        backends
    }

    async fn connect_postgres(settings: &Settings) -> Option<PostgresPool> {
        let pool = match PostgresPool::connect(&settings.database).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "PostgreSQL connection failed");
                return None;
            }
        };
        if let Err(e) = pool.ensure_schema().await {
            tracing::error!(error = %e, url = %pool.url_masked(), "PostgreSQL schema setup failed");
            return None;
        }
        Some(pool)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub start_time: Instant,
    pub channel: Arc<dyn MessageChannel>,
    pub publisher: EventPublisher,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub catalog: Arc<dyn CatalogClient>,
    pub resolver: TargetingResolver,
    pub fanout: Arc<NotificationFanout>,
    pub audit: Arc<AuditLog>,
    pub projector: Arc<AvailabilityProjector>,
    pub push: Arc<PushRegistry>,
    pub consumers: Arc<ConsumerSet>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub postgres_pool: Option<PostgresPool>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub async fn build(settings: Settings) -> Self {
        let backends = Backends::from_settings(&settings).await;
        Self::with_backends(settings, backends)
    }

    /// Wire components on top of `backends` and start the channel consumers.
    /// Must run inside a tokio runtime.
    pub fn with_backends(settings: Settings, backends: Backends) -> Self {
        let audit = Arc::new(AuditLog::new(settings.notification.audit_capacity));
        let fanout = Arc::new(NotificationFanout::new(
            backends.notifications.clone(),
            backends.email.clone(),
            audit.clone(),
            &settings.notification,
        ));
        let projector = Arc::new(AvailabilityProjector::new(
            backends.catalog.clone(),
            &settings.projector,
        ));
        let push = Arc::new(PushRegistry::new(settings.push.connection_buffer));
        let resolver = TargetingResolver::new(backends.subscriptions.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        let deps = ConsumerDeps {
            channel: backends.channel.clone(),
            projector: projector.clone(),
            resolver: resolver.clone(),
            fanout: fanout.clone(),
            catalog: backends.catalog.clone(),
            subscriptions: backends.subscriptions.clone(),
            notifications: backends.notifications.clone(),
            push: push.clone(),
        };
        let consumers = Arc::new(ConsumerSet::start(
            &deps,
            settings.consumer.queue_capacity,
            &shutdown_tx,
        ));

        Self {
            settings: Arc::new(settings),
            start_time: Instant::now(),
            publisher: EventPublisher::new(backends.channel.clone()),
            channel: backends.channel,
            subscriptions: backends.subscriptions,
            notifications: backends.notifications,
            catalog: backends.catalog,
            resolver,
            fanout,
            audit,
            projector,
            push,
            consumers,
            redis_pool: backends.redis_pool,
            postgres_pool: backends.postgres_pool,
            shutdown_tx,
        }
    }
}
