//! Topic → handler wiring.
//!
//! | Topic          | Consumers                                  |
//! |----------------|--------------------------------------------|
//! | `BookBorrowed` | availability, borrow-notifications         |
//! | `BookReturned` | availability, borrow-notifications         |
//! | `UserDeleted`  | user-cleanup                               |
//! | `BookAdded`    | catalog-notifications, push-mirror         |
//! | `BookUpdated`  | catalog-notifications, push-mirror         |
//!
//! Every pair gets its own subscription and queue, so one slow or failing
//! handler never affects another.

mod handlers;

pub use handlers::{
    AvailabilityHandler, BorrowNotificationHandler, CatalogNotificationHandler,
    PushMirrorHandler, UserDeletedHandler,
};

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::catalog::CatalogClient;
use crate::channel::{
    ChannelConsumer, ConsumerHandle, ConsumerStats, ConsumerStatsSnapshot, EventHandler,
    MessageChannel, Topic,
};
use crate::notification::{NotificationFanout, NotificationStore};
use crate::projector::AvailabilityProjector;
use crate::push::PushRegistry;
use crate::subscription::SubscriptionStore;
use crate::targeting::TargetingResolver;

/// Everything the handlers need
#[derive(Clone)]
pub struct ConsumerDeps {
    pub channel: Arc<dyn MessageChannel>,
    pub projector: Arc<AvailabilityProjector>,
    pub resolver: TargetingResolver,
    pub fanout: Arc<NotificationFanout>,
    pub catalog: Arc<dyn CatalogClient>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub push: Arc<PushRegistry>,
}

struct RunningConsumer {
    name: &'static str,
    topic: Topic,
    stats: Arc<ConsumerStats>,
}

pub struct ConsumerSet {
    running: Vec<RunningConsumer>,
    handles: Mutex<Vec<ConsumerHandle>>,
}

impl ConsumerSet {
    pub fn start(
        deps: &ConsumerDeps,
        queue_capacity: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let availability: Arc<dyn EventHandler> =
            Arc::new(AvailabilityHandler::new(deps.projector.clone()));
        let borrow_notifications: Arc<dyn EventHandler> = Arc::new(
            BorrowNotificationHandler::new(deps.fanout.clone(), deps.catalog.clone()),
        );
        let user_cleanup: Arc<dyn EventHandler> = Arc::new(UserDeletedHandler::new(
            deps.subscriptions.clone(),
            deps.notifications.clone(),
        ));
        let catalog_notifications: Arc<dyn EventHandler> = Arc::new(
            CatalogNotificationHandler::new(deps.resolver.clone(), deps.fanout.clone()),
        );
        let push_mirror: Arc<dyn EventHandler> =
            Arc::new(PushMirrorHandler::new(deps.push.clone()));

        let wiring: [(Topic, &Arc<dyn EventHandler>); 9] = [
            (Topic::BookBorrowed, &availability),
            (Topic::BookBorrowed, &borrow_notifications),
            (Topic::BookReturned, &availability),
            (Topic::BookReturned, &borrow_notifications),
            (Topic::UserDeleted, &user_cleanup),
            (Topic::BookAdded, &catalog_notifications),
            (Topic::BookAdded, &push_mirror),
            (Topic::BookUpdated, &catalog_notifications),
            (Topic::BookUpdated, &push_mirror),
        ];

        let handles: Vec<ConsumerHandle> = wiring
            .into_iter()
            .map(|(topic, handler)| {
                ChannelConsumer::new(topic, handler.clone(), deps.channel.clone(), queue_capacity)
                    .spawn(shutdown.subscribe())
            })
            .collect();

        let running = handles
            .iter()
            .map(|handle| RunningConsumer {
                name: handle.name(),
                topic: handle.topic(),
                stats: handle.stats_ref(),
            })
            .collect();

        tracing::info!(
            consumers = handles.len(),
            backend = deps.channel.backend(),
            "Channel consumers started"
        );

        Self {
            running,
            handles: Mutex::new(handles),
        }
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn stats(&self) -> Vec<ConsumerStatsSnapshot> {
        self.running
            .iter()
            .map(|c| c.stats.snapshot(c.name, c.topic))
            .collect()
    }

    /// Wait for every consumer to stop; call after the shutdown signal
    pub async fn join(&self) {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.join().await;
        }
    }
}
