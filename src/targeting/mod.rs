//! Targeting resolver: merges category and book subscribers into one entry
//! per user.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::subscription::{
    BookSubscription, CategorySubscription, SubscriptionError, SubscriptionStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Category,
    Book,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetedSubscriber {
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub subscription_type: SubscriptionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
}

impl From<CategorySubscription> for TargetedSubscriber {
    fn from(sub: CategorySubscription) -> Self {
        Self {
            user_id: sub.user_id,
            user_email: sub.user_email,
            user_name: sub.user_name,
            subscription_type: SubscriptionType::Category,
            category_name: Some(sub.category_name),
            book_id: None,
            book_title: None,
        }
    }
}

impl From<BookSubscription> for TargetedSubscriber {
    fn from(sub: BookSubscription) -> Self {
        Self {
            user_id: sub.user_id,
            user_email: sub.user_email,
            user_name: sub.user_name,
            subscription_type: SubscriptionType::Book,
            category_name: None,
            book_id: Some(sub.book_id),
            book_title: Some(sub.book_title),
        }
    }
}

/// Two passes keyed by user id: category subscribers first, then book
/// subscribers, upgrading users already present to `both`. Output keeps first
/// insertion order.
pub fn merge_targets(
    category_subscribers: Vec<CategorySubscription>,
    book_subscribers: Vec<BookSubscription>,
) -> Vec<TargetedSubscriber> {
    let mut targets: Vec<TargetedSubscriber> =
        Vec::with_capacity(category_subscribers.len() + book_subscribers.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(targets.capacity());

    for sub in category_subscribers {
        if index.contains_key(&sub.user_id) {
            continue;
        }
        index.insert(sub.user_id.clone(), targets.len());
        targets.push(sub.into());
    }

    for sub in book_subscribers {
        match index.get(&sub.user_id) {
            Some(&pos) => {
                let existing = &mut targets[pos];
                existing.subscription_type = SubscriptionType::Both;
                existing.book_id = Some(sub.book_id);
                existing.book_title = Some(sub.book_title);
            }
            None => {
                index.insert(sub.user_id.clone(), targets.len());
                targets.push(sub.into());
            }
        }
    }

    targets
}

#[derive(Clone)]
pub struct TargetingResolver {
    store: Arc<dyn SubscriptionStore>,
}

impl TargetingResolver {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Users interested in an event on `book_id` (if any) in `category_name`
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        category_name: &str,
        book_id: Option<&str>,
    ) -> Result<Vec<TargetedSubscriber>, SubscriptionError> {
        let category_lookup = self.store.list_category_subscribers(category_name);
        let book_lookup = async {
            match book_id {
                Some(id) => self.store.list_book_subscribers(id).await,
                None => Ok(Vec::new()),
            }
        };

        let (category_subscribers, book_subscribers) = tokio::join!(category_lookup, book_lookup);
        let targets = merge_targets(category_subscribers?, book_subscribers?);

        tracing::debug!(targets = targets.len(), "Resolved notification targets");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{MemorySubscriptionStore, SubscriberProfile, SubscriptionTarget};

    fn profile(user_id: &str) -> SubscriberProfile {
        SubscriberProfile {
            user_id: user_id.into(),
            user_email: format!("{}@example.com", user_id),
            user_name: user_id.into(),
        }
    }

    fn category(name: &str) -> SubscriptionTarget {
        SubscriptionTarget::Category {
            category_id: format!("c-{}", name.to_lowercase()),
            category_name: name.into(),
        }
    }

    fn book(id: &str, title: &str) -> SubscriptionTarget {
        SubscriptionTarget::Book {
            book_id: id.into(),
            book_title: title.into(),
        }
    }

    async fn resolver_with(subs: &[(&str, SubscriptionTarget)]) -> TargetingResolver {
        let store = Arc::new(MemorySubscriptionStore::new());
        for (user, target) in subs {
            store.subscribe(&profile(user), target).await.unwrap();
        }
        TargetingResolver::new(store)
    }

    #[tokio::test]
    async fn test_category_and_book_subscriber_merges_to_both() {
        let resolver = resolver_with(&[
            ("u-1", category("Science")),
            ("u-1", book("b-cosmos", "Cosmos")),
        ])
        .await;

        let targets = resolver.resolve("Science", Some("b-cosmos")).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].subscription_type, SubscriptionType::Both);
        assert_eq!(targets[0].category_name.as_deref(), Some("Science"));
        assert_eq!(targets[0].book_title.as_deref(), Some("Cosmos"));
    }

    #[tokio::test]
    async fn test_other_book_in_category_stays_category() {
        let resolver = resolver_with(&[
            ("u-1", category("Science")),
            ("u-1", book("b-cosmos", "Cosmos")),
        ])
        .await;

        let targets = resolver.resolve("science", Some("b-brief")).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].subscription_type, SubscriptionType::Category);
        assert!(targets[0].book_id.is_none());
    }

    #[tokio::test]
    async fn test_mixed_subscribers() {
        let resolver = resolver_with(&[
            ("u-1", category("Science")),
            ("u-2", book("b-cosmos", "Cosmos")),
            ("u-3", category("History")),
            ("u-4", category("Science")),
            ("u-4", book("b-cosmos", "Cosmos")),
        ])
        .await;

        let targets = resolver.resolve("Science", Some("b-cosmos")).await.unwrap();
        let by_user: HashMap<_, _> = targets
            .iter()
            .map(|t| (t.user_id.as_str(), t.subscription_type))
            .collect();

        assert_eq!(targets.len(), 3);
        assert_eq!(by_user["u-1"], SubscriptionType::Category);
        assert_eq!(by_user["u-2"], SubscriptionType::Book);
        assert_eq!(by_user["u-4"], SubscriptionType::Both);
        assert!(!by_user.contains_key("u-3"));
    }

    #[tokio::test]
    async fn test_without_book_only_category_pass_runs() {
        let resolver = resolver_with(&[("u-2", book("b-cosmos", "Cosmos"))]).await;
        assert!(resolver.resolve("Science", None).await.unwrap().is_empty());
    }

    #[test]
    fn test_merge_preserves_insertion_order() {
        let p1 = profile("u-1");
        let p2 = profile("u-2");
        let p3 = profile("u-3");
        let categories = vec![
            CategorySubscription::new(&p2, "c-sci", "Science"),
            CategorySubscription::new(&p1, "c-sci", "Science"),
        ];
        let books = vec![
            BookSubscription::new(&p3, "b-1", "Cosmos"),
            BookSubscription::new(&p2, "b-1", "Cosmos"),
        ];

        let order: Vec<_> = merge_targets(categories, books)
            .into_iter()
            .map(|t| (t.user_id, t.subscription_type))
            .collect();
        assert_eq!(
            order,
            vec![
                ("u-2".to_string(), SubscriptionType::Both),
                ("u-1".to_string(), SubscriptionType::Category),
                ("u-3".to_string(), SubscriptionType::Book),
            ]
        );
    }

    #[test]
    fn test_serialized_shape() {
        let target: TargetedSubscriber =
            BookSubscription::new(&profile("u-1"), "b-1", "Cosmos").into();
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["subscriptionType"], "book");
        assert_eq!(json["bookId"], "b-1");
        assert!(json.get("categoryName").is_none());
    }
}
