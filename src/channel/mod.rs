//! Message channel: named, at-most-once publish/subscribe topics.
//!
//! Two backends implement [`MessageChannel`]: Redis pub/sub for production and
//! an in-process broadcast bus for tests and deployments without Redis. Neither
//! persists or acknowledges messages; a subscriber that is not connected when a
//! message is published never sees it.

mod consumer;
mod events;
mod factory;
mod memory_backend;
mod publisher;
mod redis_backend;

pub use consumer::{
    ChannelConsumer, ConsumerHandle, ConsumerStats, ConsumerStatsSnapshot, EventHandler,
    HandlerError,
};
pub use events::{
    BookBorrowed, BookReturned, CatalogEvent, CatalogEventData, DecodeError, DomainEvent,
    ReceivedEvent, UserDeleted,
};
pub(crate) use consumer::panic_message;
pub use factory::create_message_channel;
pub use memory_backend::MemoryChannel;
pub use publisher::EventPublisher;
pub use redis_backend::RedisChannel;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw payloads as delivered by the broker, in broker order for one topic
pub type MessageStream = BoxStream<'static, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    BookBorrowed,
    BookReturned,
    UserDeleted,
    BookAdded,
    BookUpdated,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::BookBorrowed,
        Topic::BookReturned,
        Topic::UserDeleted,
        Topic::BookAdded,
        Topic::BookUpdated,
    ];

    /// Broker channel name
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::BookBorrowed => "BookBorrowed",
            Topic::BookReturned => "BookReturned",
            Topic::UserDeleted => "UserDeleted",
            Topic::BookAdded => "BookAdded",
            Topic::BookUpdated => "BookUpdated",
        }
    }

    pub fn is_catalog(&self) -> bool {
        matches!(self, Topic::BookAdded | Topic::BookUpdated)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| ChannelError::UnknownTopic(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message channel unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Best-effort publish/subscribe over named topics.
///
/// `publish` reports only whether the message was handed to the broker, never
/// whether anyone received it. Ordering holds per topic and per subscriber.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, topic: Topic, payload: &str) -> Result<(), ChannelError>;

    /// Fails locally when the broker cannot be reached. Once established, the
    /// stream lives until the receiver is dropped.
    async fn subscribe(&self, topic: Topic) -> Result<MessageStream, ChannelError>;

    /// Backend name for health and stats output
    fn backend(&self) -> &'static str;
}
