//! In-memory notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::store::{NotificationStore, NotificationStoreError};
use super::types::{Notification, NotificationPage, NotificationQuery};

/// Inbox per user, kept in insertion order
#[derive(Default)]
pub struct MemoryNotificationStore {
    inboxes: DashMap<String, Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row across users, expired ones included
    pub fn total(&self) -> usize {
        self.inboxes.iter().map(|inbox| inbox.len()).sum()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_batch(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationStoreError> {
        for notification in notifications {
            self.inboxes
                .entry(notification.user_id.clone())
                .or_default()
                .push(notification.clone());
        }
        Ok(notifications.len())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        query: NotificationQuery,
    ) -> Result<NotificationPage, NotificationStoreError> {
        let now = Utc::now();
        let mut visible: Vec<Notification> = self
            .inboxes
            .get(user_id)
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|n| !n.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let unread_count = visible.iter().filter(|n| !n.is_read).count();
        if query.unread_only {
            visible.retain(|n| !n.is_read);
        }
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = visible.len();
        let notifications = visible
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        Ok(NotificationPage {
            notifications,
            total,
            unread_count,
            limit: query.limit,
            offset: query.offset,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        let now = Utc::now();
        Ok(self
            .inboxes
            .get(user_id)
            .map(|inbox| {
                inbox
                    .iter()
                    .filter(|n| !n.is_read && !n.is_expired(now))
                    .count()
            })
            .unwrap_or(0))
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Notification, NotificationStoreError> {
        let mut inbox = self
            .inboxes
            .get_mut(user_id)
            .ok_or(NotificationStoreError::NotFound(notification_id))?;
        let now = Utc::now();
        let notification = inbox
            .iter_mut()
            .find(|n| n.notification_id == notification_id && !n.is_expired(now))
            .ok_or(NotificationStoreError::NotFound(notification_id))?;

        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(now);
        }
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        let now = Utc::now();
        let mut updated = 0;
        if let Some(mut inbox) = self.inboxes.get_mut(user_id) {
            for notification in inbox.iter_mut().filter(|n| !n.is_read && !n.is_expired(now)) {
                notification.is_read = true;
                notification.read_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<(), NotificationStoreError> {
        let mut inbox = self
            .inboxes
            .get_mut(user_id)
            .ok_or(NotificationStoreError::NotFound(notification_id))?;
        let before = inbox.len();
        inbox.retain(|n| n.notification_id != notification_id);
        if inbox.len() == before {
            return Err(NotificationStoreError::NotFound(notification_id));
        }
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        Ok(self
            .inboxes
            .remove(user_id)
            .map(|(_, inbox)| inbox.len())
            .unwrap_or(0))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, NotificationStoreError> {
        let mut purged = 0;
        for mut inbox in self.inboxes.iter_mut() {
            let before = inbox.len();
            inbox.retain(|n| !n.is_expired(now));
            purged += before - inbox.len();
        }
        self.inboxes.retain(|_, inbox| !inbox.is_empty());
        Ok(purged)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
