//! In-memory record of fan-out runs.
//!
//! Entries are kept in a bounded ring; the oldest entry is dropped when full.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::NotificationType;

/// Where a recipient-level failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Persist,
    Email,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientFailure {
    pub stage: FailureStage,
    /// `None` when the failure covers the whole batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub error: String,
}

/// Outcome counters of one fan-out run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutAudit {
    pub id: Uuid,
    pub event_type: NotificationType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub targets: usize,
    pub notifications_created: usize,
    pub emails_attempted: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub emails_skipped: usize,
    pub failures: Vec<RecipientFailure>,
}

impl FanoutAudit {
    pub fn start(event_type: NotificationType, targets: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            started_at: Utc::now(),
            completed_at: None,
            targets,
            notifications_created: 0,
            emails_attempted: 0,
            emails_sent: 0,
            emails_failed: 0,
            emails_skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, stage: FailureStage, user_id: Option<&str>, error: String) {
        self.failures.push(RecipientFailure {
            stage,
            user_id: user_id.map(str::to_string),
            error,
        });
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Some recipients succeeded and some did not
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty()
            && (self.notifications_created > 0 || self.emails_sent > 0)
    }

    /// Failures recorded and nothing was written or sent
    pub fn is_total_failure(&self) -> bool {
        !self.failures.is_empty() && self.notifications_created == 0 && self.emails_sent == 0
    }
}

pub struct AuditLog {
    entries: RwLock<VecDeque<FanoutAudit>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn record(&self, audit: FanoutAudit) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(audit);
    }

    /// Most recent first
    pub async fn recent(&self, limit: usize) -> Vec<FanoutAudit> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ring_drops_oldest() {
        let log = AuditLog::new(2);
        for targets in 1..=3 {
            log.record(FanoutAudit::start(NotificationType::BookAdded, targets))
                .await;
        }

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].targets, 3);
        assert_eq!(recent[1].targets, 2);
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let log = AuditLog::new(10);
        assert!(log.is_empty().await);
        for _ in 0..5 {
            log.record(FanoutAudit::start(NotificationType::BookUpdated, 0))
                .await;
        }
        assert_eq!(log.recent(3).await.len(), 3);
        assert_eq!(log.len().await, 5);
    }

    #[test]
    fn test_partial_failure_and_shape() {
        let mut audit = FanoutAudit::start(NotificationType::BookAdded, 2);
        audit.notifications_created = 2;
        audit.emails_sent = 1;
        audit.record_failure(FailureStage::Email, Some("u-2"), "smtp down".into());
        audit.complete();

        assert!(audit.is_partial_failure());
        assert!(!audit.is_total_failure());
        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["eventType"], "BOOK_ADDED");
        assert_eq!(json["notificationsCreated"], 2);
        assert_eq!(json["failures"][0]["stage"], "email");
        assert_eq!(json["failures"][0]["userId"], "u-2");
        assert!(json["completedAt"].is_string());
    }

    #[test]
    fn test_nothing_delivered_is_total_failure() {
        let mut audit = FanoutAudit::start(NotificationType::BookAdded, 1);
        audit.record_failure(FailureStage::Persist, None, "store down".into());
        audit.record_failure(FailureStage::Email, Some("u-1"), "smtp down".into());

        assert!(audit.is_total_failure());
        assert!(!audit.is_partial_failure());
    }
}
