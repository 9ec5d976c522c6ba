use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::targeting::{SubscriptionType, TargetedSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    BookAdded,
    BookUpdated,
    BookBorrowed,
    BookReturned,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BookAdded => "BOOK_ADDED",
            NotificationType::BookUpdated => "BOOK_UPDATED",
            NotificationType::BookBorrowed => "BOOK_BORROWED",
            NotificationType::BookReturned => "BOOK_RETURNED",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOK_ADDED" => Ok(NotificationType::BookAdded),
            "BOOK_UPDATED" => Ok(NotificationType::BookUpdated),
            "BOOK_BORROWED" => Ok(NotificationType::BookBorrowed),
            "BOOK_RETURNED" => Ok(NotificationType::BookReturned),
            other => Err(format!("unknown notification type: {}", other)),
        }
    }
}

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Priority {
    /// Informational, e.g. metadata edits
    Low,
    #[default]
    Normal,
    /// Time-sensitive, e.g. due dates
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Normal" => Ok(Priority::Normal),
            "High" => Ok(Priority::High),
            "Critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// One persisted, per-user notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: String,
    pub user_email: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_book_id: Option<String>,
    pub related_category_id: Option<String>,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Who a fan-out run writes to and emails
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub user_id: String,
    pub email: String,
    pub name: String,
    /// Why the user is targeted; `None` for direct recipients such as a borrower
    pub reason: Option<SubscriptionType>,
}

impl Recipient {
    pub fn direct(user_id: &str, email: &str, name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            reason: None,
        }
    }
}

impl From<&TargetedSubscriber> for Recipient {
    fn from(target: &TargetedSubscriber) -> Self {
        Self {
            user_id: target.user_id.clone(),
            email: target.user_email.clone(),
            name: target.user_name.clone(),
            reason: Some(target.subscription_type),
        }
    }
}

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationQuery {
    pub unread_only: bool,
    pub limit: usize,
    pub offset: usize,
}

impl NotificationQuery {
    pub fn new(unread_only: bool, limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            unread_only,
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self::new(false, None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub unread_count: usize,
    pub limit: usize,
    pub offset: usize,
}
