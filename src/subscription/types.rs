use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SubscriptionError;

/// Who is subscribing; copied onto the row so fan-out needs no user lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberProfile {
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
}

impl SubscriberProfile {
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.user_id.trim().is_empty() {
            return Err(SubscriptionError::Validation("userId is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Category {
        category_id: String,
        category_name: String,
    },
    Book {
        book_id: String,
        book_title: String,
    },
}

impl SubscriptionTarget {
    pub fn key(&self) -> SubscriptionKey {
        match self {
            SubscriptionTarget::Category { category_id, .. } => {
                SubscriptionKey::Category(category_id.clone())
            }
            SubscriptionTarget::Book { book_id, .. } => SubscriptionKey::Book(book_id.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), SubscriptionError> {
        let (id, label, id_field, label_field) = match self {
            SubscriptionTarget::Category {
                category_id,
                category_name,
            } => (category_id, category_name, "categoryId", "categoryName"),
            SubscriptionTarget::Book {
                book_id,
                book_title,
            } => (book_id, book_title, "bookId", "bookTitle"),
        };
        if id.trim().is_empty() {
            return Err(SubscriptionError::Validation(format!("{} is required", id_field)));
        }
        if label.trim().is_empty() {
            return Err(SubscriptionError::Validation(format!(
                "{} is required",
                label_field
            )));
        }
        Ok(())
    }
}

/// Identifies one row of either relation for a given user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Category(String),
    Book(String),
}

impl SubscriptionKey {
    pub fn describe(&self) -> String {
        match self {
            SubscriptionKey::Category(id) => format!("category {}", id),
            SubscriptionKey::Book(id) => format!("book {}", id),
        }
    }
}

/// What `subscribe` does to the (user, target) row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeTransition {
    /// No row yet
    Create,
    /// Row exists but was unsubscribed
    Reactivate,
    /// Row is active; the request conflicts
    AlreadyActive,
}

impl SubscribeTransition {
    /// `existing` is the current row's `is_active`, if a row exists
    pub fn plan(existing: Option<bool>) -> Self {
        match existing {
            None => SubscribeTransition::Create,
            Some(false) => SubscribeTransition::Reactivate,
            Some(true) => SubscribeTransition::AlreadyActive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySubscription {
    pub id: Uuid,
    pub user_id: String,
    pub category_id: String,
    pub category_name: String,
    pub user_email: String,
    pub user_name: String,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub book_id: String,
    pub book_title: String,
    pub user_email: String,
    pub user_name: String,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl CategorySubscription {
    pub fn new(profile: &SubscriberProfile, category_id: &str, category_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: profile.user_id.clone(),
            category_id: category_id.to_string(),
            category_name: category_name.to_string(),
            user_email: profile.user_email.clone(),
            user_name: profile.user_name.clone(),
            is_active: true,
            subscribed_at: Utc::now(),
            unsubscribed_at: None,
        }
    }

    /// Bring a soft-deleted row back, refreshing the copied profile fields
    pub fn reactivate(&mut self, profile: &SubscriberProfile, category_name: &str) {
        self.category_name = category_name.to_string();
        self.user_email = profile.user_email.clone();
        self.user_name = profile.user_name.clone();
        self.is_active = true;
        self.subscribed_at = Utc::now();
        self.unsubscribed_at = None;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.unsubscribed_at = Some(Utc::now());
    }
}

impl BookSubscription {
    pub fn new(profile: &SubscriberProfile, book_id: &str, book_title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: profile.user_id.clone(),
            book_id: book_id.to_string(),
            book_title: book_title.to_string(),
            user_email: profile.user_email.clone(),
            user_name: profile.user_name.clone(),
            is_active: true,
            subscribed_at: Utc::now(),
            unsubscribed_at: None,
        }
    }

    pub fn reactivate(&mut self, profile: &SubscriberProfile, book_title: &str) {
        self.book_title = book_title.to_string();
        self.user_email = profile.user_email.clone();
        self.user_name = profile.user_name.clone();
        self.is_active = true;
        self.subscribed_at = Utc::now();
        self.unsubscribed_at = None;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.unsubscribed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subscription {
    Category(CategorySubscription),
    Book(BookSubscription),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscribed {
    pub subscription: Subscription,
    pub transition: SubscribeTransition,
}

/// Active rows of both relations for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscriptions {
    pub categories: Vec<CategorySubscription>,
    pub books: Vec<BookSubscription>,
}
