use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::CatalogEventData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Unavailable,
}

impl BookStatus {
    /// Available iff at least one copy is on the shelf
    pub fn for_copies(available_copies: i32) -> Self {
        if available_copies > 0 {
            BookStatus::Available
        } else {
            BookStatus::Unavailable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(BookStatus::Available),
            "unavailable" => Ok(BookStatus::Unavailable),
            other => Err(format!("unknown book status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub cover_image_url: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub status: BookStatus,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn event_data(&self) -> CatalogEventData {
        CatalogEventData {
            book_id: self.book_id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            category: self.category.clone(),
            cover_image_url: self.cover_image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    pub total_copies: i32,
    /// Defaults to `total_copies`
    #[serde(default)]
    pub available_copies: Option<i32>,
}

impl NewBook {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("bookId", &self.book_id),
            ("title", &self.title),
            ("author", &self.author),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} is required", field));
            }
        }
        if self.total_copies < 0 {
            return Err("totalCopies must not be negative".to_string());
        }
        if let Some(available) = self.available_copies {
            if available < 0 || available > self.total_copies {
                return Err("availableCopies must be between 0 and totalCopies".to_string());
            }
        }
        Ok(())
    }

    pub fn into_book(self) -> Book {
        let available_copies = self.available_copies.unwrap_or(self.total_copies);
        Book {
            book_id: self.book_id,
            title: self.title,
            author: self.author,
            category: self.category,
            cover_image_url: self.cover_image_url,
            total_copies: self.total_copies,
            available_copies,
            status: BookStatus::for_copies(available_copies),
            updated_at: Utc::now(),
        }
    }
}

/// Descriptive fields only; copy counts are changed by borrow and return events
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetailsUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub cover_image_url: Option<String>,
}

impl BookDetailsUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_none()
            && self.author.is_none()
            && self.category.is_none()
            && self.cover_image_url.is_none()
        {
            return Err("at least one field must be provided".to_string());
        }
        for (field, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("category", &self.category),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(format!("{} must not be empty", field));
            }
        }
        Ok(())
    }

    pub fn apply(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(category) = self.category {
            book.category = category;
        }
        if let Some(url) = self.cover_image_url {
            book.cover_image_url = Some(url);
        }
        book.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityChange {
    Borrow,
    Return,
}

impl AvailabilityChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityChange::Borrow => "borrow",
            AvailabilityChange::Return => "return",
        }
    }
}

/// Result of one bounded availability adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    Applied {
        available_copies: i32,
        status: BookStatus,
    },
    NotFound,
    /// Borrow on a book with no copies left; nothing changed
    NoCopiesAvailable,
    /// Return on a book already at `total_copies`; the count is unchanged
    AtCapacity,
}

impl AdjustOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AdjustOutcome::Applied { .. } => "applied",
            AdjustOutcome::NotFound => "not_found",
            AdjustOutcome::NoCopiesAvailable => "no_copies",
            AdjustOutcome::AtCapacity => "at_capacity",
        }
    }
}
