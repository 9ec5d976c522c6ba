//! Event handlers wired onto channel topics.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{AvailabilityChange, CatalogClient};
use crate::channel::{DomainEvent, EventHandler, HandlerError, ReceivedEvent};
use crate::notification::{
    BorrowTemplate, CatalogTemplate, NotificationFanout, NotificationStore, Recipient,
    ReturnTemplate,
};
use crate::projector::{AvailabilityProjector, ProjectorError};
use crate::push::PushRegistry;
use crate::subscription::SubscriptionStore;
use crate::targeting::TargetingResolver;

fn unexpected(handler: &'static str, event: &DomainEvent) -> HandlerError {
    HandlerError::Rejected(format!("{} cannot handle {}", handler, event.topic()))
}

/// `BookBorrowed` / `BookReturned` → copy count of the book
pub struct AvailabilityHandler {
    projector: Arc<AvailabilityProjector>,
}

impl AvailabilityHandler {
    pub fn new(projector: Arc<AvailabilityProjector>) -> Self {
        Self { projector }
    }
}

#[async_trait]
impl EventHandler for AvailabilityHandler {
    fn name(&self) -> &'static str {
        "availability"
    }

    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
        let (book_id, change) = match &event.event {
            DomainEvent::BookBorrowed(e) => (e.book_id.as_str(), AvailabilityChange::Borrow),
            DomainEvent::BookReturned(e) => (e.book_id.as_str(), AvailabilityChange::Return),
            other => return Err(unexpected(self.name(), other)),
        };

        // Skipped outcomes are logged and counted by the projector
        match self.projector.apply(book_id, change).await {
            Ok(_) => Ok(()),
            Err(ProjectorError::Closed) => {
                Err(HandlerError::Infrastructure("projector is shut down".into()))
            }
            Err(ProjectorError::Catalog(e)) => Err(HandlerError::Infrastructure(e.to_string())),
        }
    }
}

/// `BookAdded` / `BookUpdated` → one notification per interested user
pub struct CatalogNotificationHandler {
    resolver: TargetingResolver,
    fanout: Arc<NotificationFanout>,
}

impl CatalogNotificationHandler {
    pub fn new(resolver: TargetingResolver, fanout: Arc<NotificationFanout>) -> Self {
        Self { resolver, fanout }
    }
}

#[async_trait]
impl EventHandler for CatalogNotificationHandler {
    fn name(&self) -> &'static str {
        "catalog-notifications"
    }

    #[tracing::instrument(name = "consumer.catalog_notifications", skip_all, fields(topic = %event.topic()))]
    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
        let (template, book) = match &event.event {
            DomainEvent::BookAdded(e) => (CatalogTemplate::added(e.data.clone()), &e.data),
            DomainEvent::BookUpdated(e) => (CatalogTemplate::updated(e.data.clone()), &e.data),
            other => return Err(unexpected(self.name(), other)),
        };

        let targets = self
            .resolver
            .resolve(&book.category, Some(&book.book_id))
            .await
            .map_err(|e| HandlerError::Infrastructure(e.to_string()))?;
        let recipients: Vec<Recipient> = targets.iter().map(Recipient::from).collect();

        self.fanout.run(&template, &recipients).await;
        Ok(())
    }
}

/// `BookBorrowed` / `BookReturned` → confirmation for the borrower
pub struct BorrowNotificationHandler {
    fanout: Arc<NotificationFanout>,
    catalog: Arc<dyn CatalogClient>,
}

impl BorrowNotificationHandler {
    pub fn new(fanout: Arc<NotificationFanout>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { fanout, catalog }
    }
}

#[async_trait]
impl EventHandler for BorrowNotificationHandler {
    fn name(&self) -> &'static str {
        "borrow-notifications"
    }

    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
        match &event.event {
            DomainEvent::BookBorrowed(e) => {
                let recipient = Recipient::direct(&e.user_id, &e.email, &e.borrower_name);
                self.fanout
                    .run(&BorrowTemplate::new(e.clone()), &[recipient])
                    .await;
            }
            DomainEvent::BookReturned(e) => {
                // The return event carries no title; a missing book still gets a notification
                let title = match self.catalog.get_book(&e.book_id).await {
                    Ok(book) => Some(book.title),
                    Err(err) => {
                        tracing::debug!(book_id = %e.book_id, error = %err, "Book title lookup failed");
                        None
                    }
                };
                let name = e.email.split('@').next().unwrap_or_default();
                let recipient = Recipient::direct(&e.user_id, &e.email, name);
                self.fanout
                    .run(&ReturnTemplate::new(e.clone(), title), &[recipient])
                    .await;
            }
            other => return Err(unexpected(self.name(), other)),
        }
        Ok(())
    }
}

/// `UserDeleted` → deactivate subscriptions and clear the inbox
pub struct UserDeletedHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl UserDeletedHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            subscriptions,
            notifications,
        }
    }
}

#[async_trait]
impl EventHandler for UserDeletedHandler {
    fn name(&self) -> &'static str {
        "user-cleanup"
    }

    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
        let DomainEvent::UserDeleted(e) = &event.event else {
            return Err(unexpected(self.name(), &event.event));
        };

        // Both cleanups are attempted even if one fails
        let (subscriptions, notifications) = tokio::join!(
            self.subscriptions.deactivate_all_for_user(&e.user_id),
            self.notifications.delete_all_for_user(&e.user_id),
        );

        match (subscriptions, notifications) {
            (Ok(deactivated), Ok(deleted)) => {
                tracing::info!(
                    user_id = %e.user_id,
                    deleted_by = %e.deleted_by,
                    deactivated,
                    deleted,
                    "Cleaned up data of deleted user"
                );
                Ok(())
            }
            (Err(e), _) => Err(HandlerError::Infrastructure(e.to_string())),
            (_, Err(e)) => Err(HandlerError::Infrastructure(e.to_string())),
        }
    }
}

/// `BookAdded` / `BookUpdated` → raw payload to every open push stream
pub struct PushMirrorHandler {
    registry: Arc<PushRegistry>,
}

impl PushMirrorHandler {
    pub fn new(registry: Arc<PushRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for PushMirrorHandler {
    fn name(&self) -> &'static str {
        "push-mirror"
    }

    async fn handle(&self, event: &ReceivedEvent) -> Result<(), HandlerError> {
        if !event.topic().is_catalog() {
            return Err(unexpected(self.name(), &event.event));
        }
        if !self.registry.is_empty() {
            self.registry.broadcast(&event.raw);
        }
        Ok(())
    }
}
