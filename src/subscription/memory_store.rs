//! In-memory subscription store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{SubscriptionError, SubscriptionStore};
use super::types::{
    BookSubscription, CategorySubscription, SubscribeTransition, SubscriberProfile, Subscribed,
    Subscription, SubscriptionKey, SubscriptionTarget, UserSubscriptions,
};

/// Rows keyed by (user_id, category_id) and (user_id, book_id). The entry API
/// holds the shard lock across check-and-write, so concurrent subscribes to the
/// same pair cannot both create.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    categories: DashMap<(String, String), CategorySubscription>,
    books: DashMap<(String, String), BookSubscription>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows including inactive ones, for tests and diagnostics
    pub fn row_count(&self) -> usize {
        self.categories.len() + self.books.len()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn subscribe(
        &self,
        profile: &SubscriberProfile,
        target: &SubscriptionTarget,
    ) -> Result<Subscribed, SubscriptionError> {
        profile.validate()?;
        target.validate()?;

        match target {
            SubscriptionTarget::Category {
                category_id,
                category_name,
            } => {
                let key = (profile.user_id.clone(), category_id.clone());
                match self.categories.entry(key) {
                    Entry::Vacant(slot) => {
                        let row = CategorySubscription::new(profile, category_id, category_name);
                        slot.insert(row.clone());
                        Ok(Subscribed {
                            subscription: Subscription::Category(row),
                            transition: SubscribeTransition::Create,
                        })
                    }
                    Entry::Occupied(mut slot) => {
                        let row = slot.get_mut();
                        match SubscribeTransition::plan(Some(row.is_active)) {
                            SubscribeTransition::AlreadyActive => Err(SubscriptionError::Conflict(
                                target.key().describe(),
                            )),
                            transition => {
                                row.reactivate(profile, category_name);
                                Ok(Subscribed {
                                    subscription: Subscription::Category(row.clone()),
                                    transition,
                                })
                            }
                        }
                    }
                }
            }
            SubscriptionTarget::Book {
                book_id,
                book_title,
            } => {
                let key = (profile.user_id.clone(), book_id.clone());
                match self.books.entry(key) {
                    Entry::Vacant(slot) => {
                        let row = BookSubscription::new(profile, book_id, book_title);
                        slot.insert(row.clone());
                        Ok(Subscribed {
                            subscription: Subscription::Book(row),
                            transition: SubscribeTransition::Create,
                        })
                    }
                    Entry::Occupied(mut slot) => {
                        let row = slot.get_mut();
                        match SubscribeTransition::plan(Some(row.is_active)) {
                            SubscribeTransition::AlreadyActive => Err(SubscriptionError::Conflict(
                                target.key().describe(),
                            )),
                            transition => {
                                row.reactivate(profile, book_title);
                                Ok(Subscribed {
                                    subscription: Subscription::Book(row.clone()),
                                    transition,
                                })
                            }
                        }
                    }
                }
            }
        }
    }

    async fn unsubscribe(
        &self,
        user_id: &str,
        key: &SubscriptionKey,
    ) -> Result<(), SubscriptionError> {
        let deactivated = match key {
            SubscriptionKey::Category(id) => self
                .categories
                .get_mut(&(user_id.to_string(), id.clone()))
                .filter(|row| row.is_active)
                .map(|mut row| row.deactivate())
                .is_some(),
            SubscriptionKey::Book(id) => self
                .books
                .get_mut(&(user_id.to_string(), id.clone()))
                .filter(|row| row.is_active)
                .map(|mut row| row.deactivate())
                .is_some(),
        };

        if deactivated {
            Ok(())
        } else {
            Err(SubscriptionError::NotFound(key.describe()))
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<UserSubscriptions, SubscriptionError> {
        let mut categories: Vec<CategorySubscription> = self
            .categories
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active)
            .map(|row| row.value().clone())
            .collect();
        let mut books: Vec<BookSubscription> = self
            .books
            .iter()
            .filter(|row| row.user_id == user_id && row.is_active)
            .map(|row| row.value().clone())
            .collect();

        categories.sort_by(|a, b| a.subscribed_at.cmp(&b.subscribed_at).then(a.id.cmp(&b.id)));
        books.sort_by(|a, b| a.subscribed_at.cmp(&b.subscribed_at).then(a.id.cmp(&b.id)));

        Ok(UserSubscriptions { categories, books })
    }

    async fn list_category_subscribers(
        &self,
        category_name: &str,
    ) -> Result<Vec<CategorySubscription>, SubscriptionError> {
        let wanted = category_name.to_lowercase();
        let mut rows: Vec<CategorySubscription> = self
            .categories
            .iter()
            .filter(|row| row.is_active && row.category_name.to_lowercase() == wanted)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| a.subscribed_at.cmp(&b.subscribed_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_book_subscribers(
        &self,
        book_id: &str,
    ) -> Result<Vec<BookSubscription>, SubscriptionError> {
        let mut rows: Vec<BookSubscription> = self
            .books
            .iter()
            .filter(|row| row.is_active && row.book_id == book_id)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| a.subscribed_at.cmp(&b.subscribed_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn deactivate_all_for_user(&self, user_id: &str) -> Result<usize, SubscriptionError> {
        let mut count = 0;
        for mut row in self.categories.iter_mut() {
            if row.user_id == user_id && row.is_active {
                row.deactivate();
                count += 1;
            }
        }
        for mut row in self.books.iter_mut() {
            if row.user_id == user_id && row.is_active {
                row.deactivate();
                count += 1;
            }
        }
        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn profile(user_id: &str) -> SubscriberProfile {
        SubscriberProfile {
            user_id: user_id.into(),
            user_email: format!("{}@example.com", user_id),
            user_name: user_id.to_uppercase(),
        }
    }

    fn science() -> SubscriptionTarget {
        SubscriptionTarget::Category {
            category_id: "c-sci".into(),
            category_name: "Science".into(),
        }
    }

    fn cosmos() -> SubscriptionTarget {
        SubscriptionTarget::Book {
            book_id: "b-cosmos".into(),
            book_title: "Cosmos".into(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_subscribe_keeps_one_row() {
        let store = MemorySubscriptionStore::new();

        let first = assert_ok!(store.subscribe(&profile("u-1"), &science()).await);
        assert_eq!(first.transition, SubscribeTransition::Create);

        assert_ok!(
            store
                .unsubscribe("u-1", &SubscriptionKey::Category("c-sci".into()))
                .await
        );
        assert!(store.list_category_subscribers("Science").await.unwrap().is_empty());

        let again = assert_ok!(store.subscribe(&profile("u-1"), &science()).await);
        assert_eq!(again.transition, SubscribeTransition::Reactivate);

        let (first_row, again_row) = match (first.subscription, again.subscription) {
            (Subscription::Category(a), Subscription::Category(b)) => (a, b),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(first_row.id, again_row.id);
        assert!(again_row.subscribed_at >= first_row.subscribed_at);

        assert_eq!(store.row_count(), 1);
        assert_eq!(store.list_category_subscribers("science").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_active_subscribe_conflicts() {
        let store = MemorySubscriptionStore::new();
        assert_ok!(store.subscribe(&profile("u-1"), &cosmos()).await);

        let err = assert_err!(store.subscribe(&profile("u-1"), &cosmos()).await);
        assert!(matches!(err, SubscriptionError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_subscribes_create_once() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.subscribe(&profile("u-1"), &science()).await.is_ok()
            }));
        }

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_missing_or_inactive_is_not_found() {
        let store = MemorySubscriptionStore::new();
        let key = SubscriptionKey::Book("b-cosmos".into());
        assert!(matches!(
            store.unsubscribe("u-1", &key).await,
            Err(SubscriptionError::NotFound(_))
        ));

        assert_ok!(store.subscribe(&profile("u-1"), &cosmos()).await);
        assert_ok!(store.unsubscribe("u-1", &key).await);
        assert!(matches!(
            store.unsubscribe("u-1", &key).await,
            Err(SubscriptionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_for_user_returns_active_rows_of_both_relations() {
        let store = MemorySubscriptionStore::new();
        assert_ok!(store.subscribe(&profile("u-1"), &science()).await);
        assert_ok!(store.subscribe(&profile("u-1"), &cosmos()).await);
        assert_ok!(store.subscribe(&profile("u-2"), &cosmos()).await);
        assert_ok!(
            store
                .unsubscribe("u-1", &SubscriptionKey::Book("b-cosmos".into()))
                .await
        );

        let subs = store.list_for_user("u-1").await.unwrap();
        assert_eq!(subs.categories.len(), 1);
        assert!(subs.books.is_empty());
        assert_eq!(store.list_book_subscribers("b-cosmos").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_all_for_user() {
        let store = MemorySubscriptionStore::new();
        assert_ok!(store.subscribe(&profile("u-1"), &science()).await);
        assert_ok!(store.subscribe(&profile("u-1"), &cosmos()).await);
        assert_ok!(store.subscribe(&profile("u-2"), &science()).await);

        assert_eq!(store.deactivate_all_for_user("u-1").await.unwrap(), 2);
        assert_eq!(store.deactivate_all_for_user("u-1").await.unwrap(), 0);

        let remaining = store.list_category_subscribers("Science").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "u-2");
    }

    #[tokio::test]
    async fn test_validation() {
        let store = MemorySubscriptionStore::new();
        let err = assert_err!(store.subscribe(&profile(""), &science()).await);
        assert!(matches!(err, SubscriptionError::Validation(_)));
    }
}
