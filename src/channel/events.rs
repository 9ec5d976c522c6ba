//! Typed payloads for every topic, validated when they cross the channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Topic;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Required field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("Event type `{found}` does not match topic `{expected}`")]
    TypeMismatch { expected: Topic, found: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookBorrowed {
    pub borrow_id: String,
    pub user_id: String,
    pub book_id: String,
    pub email: String,
    pub borrower_name: String,
    pub book_title: String,
    pub due_date: DateTime<Utc>,
    pub borrow_date: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookReturned {
    pub borrow_id: String,
    pub user_id: String,
    pub book_id: String,
    pub email: String,
    pub return_date: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeleted {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub deleted_by: String,
    pub timestamp: DateTime<Utc>,
}

/// `BookAdded` / `BookUpdated` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: CatalogEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEventData {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

impl CatalogEvent {
    pub fn new(topic: Topic, data: CatalogEventData) -> Self {
        Self {
            event_type: topic.as_str().to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    BookBorrowed(BookBorrowed),
    BookReturned(BookReturned),
    UserDeleted(UserDeleted),
    BookAdded(CatalogEvent),
    BookUpdated(CatalogEvent),
}

fn require(value: &str, field: &'static str) -> Result<(), DecodeError> {
    if value.trim().is_empty() {
        return Err(DecodeError::EmptyField(field));
    }
    Ok(())
}

impl DomainEvent {
    /// Parse and validate a raw payload received on `topic`
    pub fn decode(topic: Topic, payload: &str) -> Result<Self, DecodeError> {
        let event = match topic {
            Topic::BookBorrowed => {
                let e: BookBorrowed = serde_json::from_str(payload)?;
                require(&e.borrow_id, "borrowId")?;
                require(&e.user_id, "userId")?;
                require(&e.book_id, "bookId")?;
                DomainEvent::BookBorrowed(e)
            }
            Topic::BookReturned => {
                let e: BookReturned = serde_json::from_str(payload)?;
                require(&e.borrow_id, "borrowId")?;
                require(&e.user_id, "userId")?;
                require(&e.book_id, "bookId")?;
                DomainEvent::BookReturned(e)
            }
            Topic::UserDeleted => {
                let e: UserDeleted = serde_json::from_str(payload)?;
                require(&e.user_id, "userId")?;
                DomainEvent::UserDeleted(e)
            }
            Topic::BookAdded | Topic::BookUpdated => {
                let e: CatalogEvent = serde_json::from_str(payload)?;
                if e.event_type != topic.as_str() {
                    return Err(DecodeError::TypeMismatch {
                        expected: topic,
                        found: e.event_type,
                    });
                }
                require(&e.data.book_id, "data.bookId")?;
                require(&e.data.title, "data.title")?;
                require(&e.data.category, "data.category")?;
                if topic == Topic::BookAdded {
                    DomainEvent::BookAdded(e)
                } else {
                    DomainEvent::BookUpdated(e)
                }
            }
        };
        Ok(event)
    }

    pub fn topic(&self) -> Topic {
        match self {
            DomainEvent::BookBorrowed(_) => Topic::BookBorrowed,
            DomainEvent::BookReturned(_) => Topic::BookReturned,
            DomainEvent::UserDeleted(_) => Topic::UserDeleted,
            DomainEvent::BookAdded(_) => Topic::BookAdded,
            DomainEvent::BookUpdated(_) => Topic::BookUpdated,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            DomainEvent::BookBorrowed(e) => serde_json::to_string(e),
            DomainEvent::BookReturned(e) => serde_json::to_string(e),
            DomainEvent::UserDeleted(e) => serde_json::to_string(e),
            DomainEvent::BookAdded(e) | DomainEvent::BookUpdated(e) => serde_json::to_string(e),
        }
    }

    /// Book the event is about, used as the ordering key
    pub fn book_id(&self) -> Option<&str> {
        match self {
            DomainEvent::BookBorrowed(e) => Some(&e.book_id),
            DomainEvent::BookReturned(e) => Some(&e.book_id),
            DomainEvent::BookAdded(e) | DomainEvent::BookUpdated(e) => Some(&e.data.book_id),
            DomainEvent::UserDeleted(_) => None,
        }
    }
}

/// A validated event together with the exact bytes it arrived as
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub event: DomainEvent,
    pub raw: Arc<str>,
    pub received_at: DateTime<Utc>,
}

impl ReceivedEvent {
    pub fn decode(topic: Topic, payload: &str) -> Result<Self, DecodeError> {
        Ok(Self {
            event: DomainEvent::decode(topic, payload)?,
            raw: Arc::from(payload),
            received_at: Utc::now(),
        })
    }

    pub fn topic(&self) -> Topic {
        self.event.topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BORROWED: &str = r#"{
        "borrowId": "br-1",
        "userId": "u-1",
        "bookId": "b-1",
        "email": "ada@example.com",
        "borrowerName": "Ada",
        "bookTitle": "Cosmos",
        "dueDate": "2026-11-01T00:00:00.000Z",
        "borrowDate": "2026-10-18T09:30:00.000Z",
        "timestamp": "2026-10-18T09:30:00.120Z"
    }"#;

    #[test]
    fn test_decode_borrowed() {
        let event = DomainEvent::decode(Topic::BookBorrowed, BORROWED).unwrap();
        match &event {
            DomainEvent::BookBorrowed(e) => {
                assert_eq!(e.book_id, "b-1");
                assert_eq!(e.borrower_name, "Ada");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(event.book_id(), Some("b-1"));
    }

    #[test]
    fn test_decode_catalog_event() {
        let payload = r#"{
            "type": "BookAdded",
            "timestamp": "2026-10-18T09:30:00Z",
            "data": {"bookId": "b-9", "title": "Cosmos", "author": "Carl Sagan", "category": "Science"}
        }"#;
        let event = DomainEvent::decode(Topic::BookAdded, payload).unwrap();
        match event {
            DomainEvent::BookAdded(e) => {
                assert_eq!(e.data.category, "Science");
                assert!(e.data.cover_image_url.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_type_must_match_topic() {
        let payload = r#"{
            "type": "BookUpdated",
            "timestamp": "2026-10-18T09:30:00Z",
            "data": {"bookId": "b-9", "title": "Cosmos", "author": "Carl Sagan", "category": "Science"}
        }"#;
        let err = DomainEvent::decode(Topic::BookAdded, payload).unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_and_empty_fields_rejected() {
        assert!(matches!(
            DomainEvent::decode(Topic::UserDeleted, r#"{"userId": "u-1"}"#),
            Err(DecodeError::Json(_))
        ));

        let empty_user = BORROWED.replace("\"u-1\"", "\"\"");
        assert!(matches!(
            DomainEvent::decode(Topic::BookBorrowed, &empty_user),
            Err(DecodeError::EmptyField("userId"))
        ));

        assert!(DomainEvent::decode(Topic::BookReturned, "not json").is_err());
    }

    #[test]
    fn test_received_event_keeps_raw_payload() {
        let received = ReceivedEvent::decode(Topic::BookBorrowed, BORROWED).unwrap();
        assert_eq!(&*received.raw, BORROWED);
        assert_eq!(received.topic(), Topic::BookBorrowed);
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let event = DomainEvent::BookUpdated(CatalogEvent::new(
            Topic::BookUpdated,
            CatalogEventData {
                book_id: "b-1".into(),
                title: "Cosmos".into(),
                author: "Carl Sagan".into(),
                category: "Science".into(),
                cover_image_url: Some("https://img/cosmos.jpg".into()),
            },
        ));
        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "BookUpdated");
        assert_eq!(json["data"]["bookId"], "b-1");
        assert_eq!(json["data"]["coverImageUrl"], "https://img/cosmos.jpg");
    }
}
