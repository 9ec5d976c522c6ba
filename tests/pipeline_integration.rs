//! End-to-end event flows: producer routes and raw publishes travel through
//! the in-process channel into the consumers, and their effects are read
//! back from the stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::Utc;

use shelf_notification_service::catalog::{BookStatus, CatalogClient, NewBook};
use shelf_notification_service::channel::{
    BookBorrowed, BookReturned, DomainEvent, MessageChannel, Topic, UserDeleted,
};
use shelf_notification_service::config::Settings;
use shelf_notification_service::email::{EmailError, EmailSender};
use shelf_notification_service::notification::{NotificationQuery, NotificationType};

use common::{book_subscription_body, category_body, eventually, new_book_body, TestService};

async fn notification_count(service: &TestService, user_id: &str) -> usize {
    service
        .state
        .notifications
        .list_for_user(user_id, NotificationQuery::default())
        .await
        .unwrap()
        .total
}

fn borrowed(user_id: &str, book_id: &str) -> DomainEvent {
    let now = Utc::now();
    DomainEvent::BookBorrowed(BookBorrowed {
        borrow_id: format!("br-{}-{}", user_id, book_id),
        user_id: user_id.to_string(),
        book_id: book_id.to_string(),
        email: format!("{}@example.com", user_id),
        borrower_name: "Ada".to_string(),
        book_title: "Cosmos".to_string(),
        due_date: now + chrono::Duration::days(14),
        borrow_date: now,
        timestamp: now,
    })
}

fn returned(user_id: &str, book_id: &str) -> DomainEvent {
    let now = Utc::now();
    DomainEvent::BookReturned(BookReturned {
        borrow_id: format!("br-{}-{}", user_id, book_id),
        user_id: user_id.to_string(),
        book_id: book_id.to_string(),
        email: format!("{}@example.com", user_id),
        return_date: now,
        timestamp: now,
    })
}

async fn seed_book(service: &TestService, total: i32, available: i32) {
    service
        .state
        .catalog
        .insert_book(NewBook {
            book_id: "cosmos".into(),
            title: "Cosmos".into(),
            author: "Carl Sagan".into(),
            category: "Science".into(),
            cover_image_url: None,
            total_copies: total,
            available_copies: Some(available),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_category_subscriber_notified_of_new_book() {
    let service = &TestService::start().await;

    let (status, _) = service
        .request(
            Method::POST,
            "/api/v1/users/u-1/subscriptions/categories",
            Some(category_body("cat-sci", "Science", "Ada")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "available");

    eventually(|| async move { notification_count(service, "u-1").await == 1 }).await;

    let page = service
        .state
        .notifications
        .list_for_user("u-1", NotificationQuery::default())
        .await
        .unwrap();
    let notification = &page.notifications[0];
    assert_eq!(notification.notification_type, NotificationType::BookAdded);
    assert_eq!(notification.related_book_id.as_deref(), Some("cosmos"));
    assert_eq!(notification.metadata["subscriptionType"], "category");
}

#[tokio::test]
async fn test_overlapping_subscriptions_notify_once() {
    let service = &TestService::start().await;

    service
        .request(
            Method::POST,
            "/api/v1/users/u-1/subscriptions/categories",
            Some(category_body("cat-sci", "Science", "Ada")),
        )
        .await;
    service
        .request(
            Method::POST,
            "/api/v1/users/u-1/subscriptions/books",
            Some(book_subscription_body("cosmos", "Cosmos", "Ada")),
        )
        .await;

    service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;

    eventually(|| async move { service.state.audit.len().await == 1 }).await;

    let page = service
        .state
        .notifications
        .list_for_user("u-1", NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.notifications[0].metadata["subscriptionType"], "both");
}

#[tokio::test]
async fn test_book_update_notifies_book_subscribers() {
    let service = &TestService::start().await;
    seed_book(service, 3, 3).await;

    service
        .request(
            Method::POST,
            "/api/v1/users/u-2/subscriptions/books",
            Some(book_subscription_body("cosmos", "Cosmos", "Grace")),
        )
        .await;

    let (status, body) = service
        .request(
            Method::PUT,
            "/api/v1/books/cosmos",
            Some(serde_json::json!({ "title": "Cosmos (Illustrated)" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Cosmos (Illustrated)");

    eventually(|| async move { notification_count(service, "u-2").await == 1 }).await;
    let page = service
        .state
        .notifications
        .list_for_user("u-2", NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(
        page.notifications[0].notification_type,
        NotificationType::BookUpdated
    );
}

#[tokio::test]
async fn test_borrow_and_return_move_availability() {
    let service = &TestService::start().await;
    seed_book(service, 3, 1).await;

    assert!(service.state.publisher.publish(&borrowed("u-1", "cosmos")).await);
    eventually(|| async move {
        let book = service.state.catalog.get_book("cosmos").await.unwrap();
        book.available_copies == 0 && book.status == BookStatus::Unavailable
    })
    .await;

    assert!(service.state.publisher.publish(&returned("u-1", "cosmos")).await);
    eventually(|| async move {
        let book = service.state.catalog.get_book("cosmos").await.unwrap();
        book.available_copies == 1 && book.status == BookStatus::Available
    })
    .await;

    // Borrow confirmation and return receipt for the borrower
    eventually(|| async move { notification_count(service, "u-1").await == 2 }).await;
}

#[tokio::test]
async fn test_concurrent_borrows_stay_within_bounds() {
    let service = &TestService::start().await;
    seed_book(service, 3, 3).await;

    for i in 0..10 {
        let publisher = service.state.publisher.clone();
        let event = borrowed(&format!("u-{}", i), "cosmos");
        tokio::spawn(async move { publisher.publish(&event).await });
    }

    eventually(|| async move {
        let projector = service.state.projector.stats();
        projector.applied + projector.no_copies == 10
    })
    .await;

    let projector = service.state.projector.stats();
    assert_eq!(projector.applied, 3);
    assert_eq!(projector.no_copies, 7);
    let book = service.state.catalog.get_book("cosmos").await.unwrap();
    assert_eq!(book.available_copies, 0);
}

#[tokio::test]
async fn test_unreachable_broker_does_not_fail_producer() {
    let service = &TestService::start().await;
    service.channel.set_available(false);

    service
        .request(
            Method::POST,
            "/api/v1/users/u-1/subscriptions/categories",
            Some(category_body("cat-sci", "Science", "Ada")),
        )
        .await;
    let (status, _) = service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(service.state.catalog.get_book("cosmos").await.is_ok());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(notification_count(service, "u-1").await, 0);
    assert!(service
        .state
        .consumers
        .stats()
        .iter()
        .all(|consumer| consumer.received == 0));
}

#[tokio::test]
async fn test_user_deleted_clears_subscriptions_and_inbox() {
    let service = &TestService::start().await;
    service
        .request(
            Method::POST,
            "/api/v1/users/u-1/subscriptions/categories",
            Some(category_body("cat-sci", "Science", "Ada")),
        )
        .await;
    service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;
    eventually(|| async move { notification_count(service, "u-1").await == 1 }).await;

    let event = DomainEvent::UserDeleted(UserDeleted {
        user_id: "u-1".into(),
        username: "ada".into(),
        email: "ada@example.com".into(),
        deleted_by: "admin".into(),
        timestamp: Utc::now(),
    });
    assert!(service.state.publisher.publish(&event).await);

    eventually(|| async move { notification_count(service, "u-1").await == 0 }).await;
    let subscriptions = service.state.subscriptions.list_for_user("u-1").await.unwrap();
    assert!(subscriptions.categories.is_empty());
}

#[tokio::test]
async fn test_catalog_events_reach_push_clients() {
    let service = &TestService::start().await;
    let (_, mut frames) = service.state.push.register().unwrap();

    service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .unwrap()
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(payload["type"], "BookAdded");
    assert_eq!(payload["data"]["bookId"], "cosmos");
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_and_consumer_survives() {
    let service = &TestService::start().await;
    seed_book(service, 2, 2).await;

    service
        .channel
        .publish(Topic::BookBorrowed, "{not json")
        .await
        .unwrap();
    assert!(service.state.publisher.publish(&borrowed("u-1", "cosmos")).await);

    let rejected = || {
        service
            .state
            .consumers
            .stats()
            .iter()
            .filter(|consumer| consumer.topic == Topic::BookBorrowed)
            .map(|consumer| consumer.rejected)
            .sum::<u64>()
    };
    eventually(|| async move {
        service.state.catalog.get_book("cosmos").await.unwrap().available_copies == 1
            && rejected() == 2
    })
    .await;
}

struct RejectingSender;

#[async_trait]
impl EmailSender for RejectingSender {
    async fn send(&self, to: &str, _: &str, _: &str, _: &str) -> Result<(), EmailError> {
        Err(EmailError::Delivery(format!("mailbox {} unavailable", to)))
    }

    fn name(&self) -> &'static str {
        "rejecting"
    }
}

#[tokio::test]
async fn test_email_failures_do_not_reduce_notification_count() {
    let service = &TestService::with(Settings::default(), |backends| {
        backends.email = Arc::new(RejectingSender);
    })
    .await;

    for (user, name) in [("u-1", "Ada"), ("u-2", "Grace"), ("u-3", "Linus")] {
        let (status, _) = service
            .request(
                Method::POST,
                &format!("/api/v1/users/{}/subscriptions/categories", user),
                Some(category_body("cat-sci", "Science", name)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    service
        .request(
            Method::POST,
            "/api/v1/books",
            Some(new_book_body("cosmos", "Cosmos", "Science", 3)),
        )
        .await;

    eventually(|| async move { service.state.audit.len().await == 1 }).await;
    let audit = service.state.audit.recent(1).await.remove(0);
    assert_eq!(audit.targets, 3);
    assert_eq!(audit.notifications_created, 3);
    assert_eq!(audit.emails_failed, 3);
    assert!(audit.is_partial_failure());

    for user in ["u-1", "u-2", "u-3"] {
        assert_eq!(notification_count(service, user).await, 1);
    }
}
