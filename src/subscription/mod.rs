//! Subscription store: who wants to hear about which categories and books.

mod memory_store;
mod postgres_store;
mod store;
mod types;

pub use memory_store::MemorySubscriptionStore;
pub use postgres_store::PostgresSubscriptionStore;
pub use store::{SubscriptionError, SubscriptionStore};
pub use types::{
    BookSubscription, CategorySubscription, SubscribeTransition, SubscriberProfile, Subscribed,
    Subscription, SubscriptionKey, SubscriptionTarget, UserSubscriptions,
};
