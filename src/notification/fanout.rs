//! Notification fan-out: one persisted row and one independent email attempt
//! per recipient.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use super::audit::{AuditLog, FailureStage, FanoutAudit};
use super::store::NotificationStore;
use super::template::{NotificationTemplate, RenderedNotification};
use super::types::{Notification, Recipient};
use crate::email::{EmailError, EmailSender};
use crate::infrastructure::config::NotificationConfig;
use crate::infrastructure::metrics::FanoutMetrics;

#[derive(Debug, Default)]
pub struct FanoutStats {
    pub runs: AtomicU64,
    pub notifications_created: AtomicU64,
    pub persist_failures: AtomicU64,
    pub emails_sent: AtomicU64,
    pub emails_failed: AtomicU64,
    pub emails_skipped: AtomicU64,
}

impl FanoutStats {
    pub fn snapshot(&self) -> FanoutStatsSnapshot {
        FanoutStatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            notifications_created: self.notifications_created.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            emails_sent: self.emails_sent.load(Ordering::Relaxed),
            emails_failed: self.emails_failed.load(Ordering::Relaxed),
            emails_skipped: self.emails_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutStatsSnapshot {
    pub runs: u64,
    pub notifications_created: u64,
    pub persist_failures: u64,
    pub emails_sent: u64,
    pub emails_failed: u64,
    pub emails_skipped: u64,
}

enum EmailOutcome {
    Sent,
    Skipped,
    Failed(String),
}

pub struct NotificationFanout {
    store: Arc<dyn NotificationStore>,
    email: Arc<dyn EmailSender>,
    audit: Arc<AuditLog>,
    expiry: Option<Duration>,
    max_concurrent_emails: usize,
    stats: FanoutStats,
}

impl NotificationFanout {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        email: Arc<dyn EmailSender>,
        audit: Arc<AuditLog>,
        config: &NotificationConfig,
    ) -> Self {
        // A non-positive expiry keeps notifications forever
        let expiry = (config.expiry_days > 0).then(|| Duration::days(config.expiry_days));
        Self {
            store,
            email,
            audit,
            expiry,
            max_concurrent_emails: config.max_concurrent_emails.max(1),
            stats: FanoutStats::default(),
        }
    }

    pub fn stats(&self) -> FanoutStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Persist one notification per recipient, then attempt every email.
    ///
    /// Neither a failed batch write nor any email failure stops the run; both
    /// end up in the returned audit entry, which is also appended to the log.
    #[tracing::instrument(
        skip(self, template, recipients),
        fields(notification_type = %template.notification_type(), targets = recipients.len())
    )]
    pub async fn run(
        &self,
        template: &dyn NotificationTemplate,
        recipients: &[Recipient],
    ) -> FanoutAudit {
        let started = Instant::now();
        let notification_type = template.notification_type();
        let mut audit = FanoutAudit::start(notification_type, recipients.len());
        self.stats.runs.fetch_add(1, Ordering::Relaxed);

        let rendered: Vec<(&Recipient, RenderedNotification)> = recipients
            .iter()
            .map(|recipient| (recipient, template.render(recipient)))
            .collect();

        let created_at = Utc::now();
        let expires_at = self.expiry.map(|expiry| created_at + expiry);
        let rows: Vec<Notification> = rendered
            .iter()
            .map(|(recipient, content)| Notification {
                notification_id: Uuid::new_v4(),
                user_id: recipient.user_id.clone(),
                user_email: recipient.email.clone(),
                notification_type,
                title: content.title.clone(),
                message: content.message.clone(),
                related_book_id: content.related_book_id.clone(),
                related_category_id: content.related_category_id.clone(),
                metadata: content.metadata.clone(),
                is_read: false,
                read_at: None,
                priority: content.priority,
                created_at,
                expires_at,
            })
            .collect();

        if !rows.is_empty() {
            match self.store.insert_batch(&rows).await {
                Ok(written) => {
                    audit.notifications_created = written;
                    self.stats
                        .notifications_created
                        .fetch_add(written as u64, Ordering::Relaxed);
                    FanoutMetrics::record_created(notification_type.as_str(), written);
                }
                Err(e) => {
                    self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        error = %e,
                        rows = rows.len(),
                        backend = self.store.backend(),
                        "Notification batch write failed"
                    );
                    audit.record_failure(FailureStage::Persist, None, e.to_string());
                }
            }
        }

        let sends: Vec<BoxFuture<'_, (String, EmailOutcome)>> = rendered
            .iter()
            .map(|(recipient, content)| {
                let recipient: &Recipient = recipient;
                async move {
                    let outcome = self.send_email(recipient, content).await;
                    (recipient.user_id.clone(), outcome)
                }
                .boxed()
            })
            .collect();
        let outcomes: Vec<(String, EmailOutcome)> = stream::iter(sends)
            .buffer_unordered(self.max_concurrent_emails)
            .collect()
            .await;

        for (user_id, outcome) in outcomes {
            match outcome {
                EmailOutcome::Sent => audit.emails_sent += 1,
                EmailOutcome::Skipped => audit.emails_skipped += 1,
                EmailOutcome::Failed(error) => {
                    audit.emails_failed += 1;
                    audit.record_failure(FailureStage::Email, Some(&user_id), error);
                }
            }
        }
        audit.emails_attempted = audit.emails_sent + audit.emails_failed;

        self.stats
            .emails_sent
            .fetch_add(audit.emails_sent as u64, Ordering::Relaxed);
        self.stats
            .emails_failed
            .fetch_add(audit.emails_failed as u64, Ordering::Relaxed);
        self.stats
            .emails_skipped
            .fetch_add(audit.emails_skipped as u64, Ordering::Relaxed);
        FanoutMetrics::record_emails(audit.emails_sent, audit.emails_failed, audit.emails_skipped);
        FanoutMetrics::record_run(recipients.len(), started.elapsed().as_secs_f64());

        audit.complete();
        if audit.is_total_failure() {
            tracing::error!(
                audit_id = %audit.id,
                failures = audit.failures.len(),
                "Fan-out failed for every recipient"
            );
        } else if audit.is_partial_failure() {
            tracing::warn!(
                audit_id = %audit.id,
                failures = audit.failures.len(),
                "Fan-out completed with partial failures"
            );
        } else {
            tracing::info!(
                audit_id = %audit.id,
                created = audit.notifications_created,
                emails_sent = audit.emails_sent,
                "Fan-out completed"
            );
        }

        self.audit.record(audit.clone()).await;
        audit
    }

    async fn send_email(&self, recipient: &Recipient, content: &RenderedNotification) -> EmailOutcome {
        if recipient.email.trim().is_empty() {
            return EmailOutcome::Skipped;
        }

        let email = &content.email;
        match self
            .email
            .send(&recipient.email, &email.subject, &email.html, &email.text)
            .await
        {
            Ok(()) => EmailOutcome::Sent,
            Err(EmailError::Disabled) => EmailOutcome::Skipped,
            Err(e) => {
                tracing::warn!(
                    user_id = %recipient.user_id,
                    sender = self.email.name(),
                    error = %e,
                    "Email delivery failed"
                );
                EmailOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CatalogEventData;
    use crate::notification::{
        CatalogTemplate, MemoryNotificationStore, NotificationPage, NotificationQuery,
        NotificationStoreError,
    };
    use async_trait::async_trait;
    use chrono::DateTime;

    struct FlakySender;

    #[async_trait]
    impl EmailSender for FlakySender {
        async fn send(&self, to: &str, _: &str, _: &str, _: &str) -> Result<(), EmailError> {
            if to.starts_with("bad") {
                Err(EmailError::Delivery("mailbox full".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl NotificationStore for BrokenStore {
        async fn insert_batch(&self, _: &[Notification]) -> Result<usize, NotificationStoreError> {
            Err(NotificationStoreError::Unavailable("down".into()))
        }
        async fn list_for_user(
            &self,
            _: &str,
            _: NotificationQuery,
        ) -> Result<NotificationPage, NotificationStoreError> {
            Err(NotificationStoreError::Unavailable("down".into()))
        }
        async fn unread_count(&self, _: &str) -> Result<usize, NotificationStoreError> {
            Err(NotificationStoreError::Unavailable("down".into()))
        }
        async fn mark_read(&self, _: &str, id: Uuid) -> Result<Notification, NotificationStoreError> {
            Err(NotificationStoreError::NotFound(id))
        }
        async fn mark_all_read(&self, _: &str) -> Result<usize, NotificationStoreError> {
            Ok(0)
        }
        async fn delete(&self, _: &str, id: Uuid) -> Result<(), NotificationStoreError> {
            Err(NotificationStoreError::NotFound(id))
        }
        async fn delete_all_for_user(&self, _: &str) -> Result<usize, NotificationStoreError> {
            Ok(0)
        }
        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<usize, NotificationStoreError> {
            Ok(0)
        }
        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn template() -> CatalogTemplate {
        CatalogTemplate::added(CatalogEventData {
            book_id: "b-1".into(),
            title: "Cosmos".into(),
            author: "Carl Sagan".into(),
            category: "Science".into(),
            cover_image_url: None,
        })
    }

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient::direct("u-1", "ada@example.com", "Ada"),
            Recipient::direct("u-2", "bad@example.com", "Bob"),
            Recipient::direct("u-3", "", "Cy"),
        ]
    }

    fn fanout(store: Arc<dyn NotificationStore>) -> NotificationFanout {
        NotificationFanout::new(
            store,
            Arc::new(FlakySender),
            Arc::new(AuditLog::new(10)),
            &NotificationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_rows_written_regardless_of_email_outcome() {
        let store = Arc::new(MemoryNotificationStore::new());
        let fanout = fanout(store.clone());

        let audit = fanout.run(&template(), &recipients()).await;

        assert_eq!(store.total(), 3);
        assert_eq!(audit.targets, 3);
        assert_eq!(audit.notifications_created, 3);
        assert_eq!(audit.emails_sent, 1);
        assert_eq!(audit.emails_failed, 1);
        assert_eq!(audit.emails_skipped, 1);
        assert_eq!(audit.emails_attempted, 2);
        assert_eq!(audit.failures.len(), 1);
        assert_eq!(audit.failures[0].user_id.as_deref(), Some("u-2"));
        assert!(audit.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_rows_carry_expiry_and_fresh_ids() {
        let store = Arc::new(MemoryNotificationStore::new());
        let fanout = fanout(store.clone());
        fanout.run(&template(), &recipients()[..1]).await;
        fanout.run(&template(), &recipients()[..1]).await;

        let page = store
            .list_for_user("u-1", NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_ne!(
            page.notifications[0].notification_id,
            page.notifications[1].notification_id
        );
        let first = &page.notifications[0];
        assert_eq!(first.expires_at, Some(first.created_at + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_failed_batch_write_still_sends_emails() {
        let fanout = fanout(Arc::new(BrokenStore));

        let audit = fanout.run(&template(), &recipients()).await;

        assert_eq!(audit.notifications_created, 0);
        assert_eq!(audit.emails_sent, 1);
        assert_eq!(audit.failures[0].stage, FailureStage::Persist);
        assert!(audit.failures[0].user_id.is_none());
        assert_eq!(fanout.stats().persist_failures, 1);
    }

    #[tokio::test]
    async fn test_run_is_recorded_in_audit_log() {
        let fanout = fanout(Arc::new(MemoryNotificationStore::new()));
        let audit = fanout.run(&template(), &[]).await;

        let recent = fanout.audit_log().recent(5).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, audit.id);
        assert_eq!(recent[0].targets, 0);
    }

    #[tokio::test]
    async fn test_redelivered_event_writes_a_second_batch() {
        let store = Arc::new(MemoryNotificationStore::new());
        let fanout = fanout(store.clone());
        let targets = recipients();

        fanout.run(&template(), &targets).await;
        fanout.run(&template(), &targets).await;

        assert_eq!(store.total(), 2 * targets.len());
        let mut ids = Vec::new();
        for recipient in &targets {
            let page = store
                .list_for_user(&recipient.user_id, NotificationQuery::default())
                .await
                .unwrap();
            assert_eq!(page.total, 2);
            ids.extend(page.notifications.iter().map(|n| n.notification_id));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 2 * targets.len());
    }

    #[tokio::test]
    async fn test_run_with_nothing_delivered_is_total_failure() {
        let fanout = fanout(Arc::new(BrokenStore));
        let targets = vec![Recipient::direct("u-2", "bad@example.com", "Bob")];

        let audit = fanout.run(&template(), &targets).await;

        assert!(audit.is_total_failure());
        assert!(!audit.is_partial_failure());
        assert_eq!(audit.failures.len(), 2);
    }
}
