//! Shared harness: a fully wired service on in-process backends.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use shelf_notification_service::channel::{MemoryChannel, Topic};
use shelf_notification_service::config::Settings;
use shelf_notification_service::server::{create_app, AppState, Backends};

pub struct TestService {
    pub state: AppState,
    pub channel: Arc<MemoryChannel>,
    pub app: Router,
}

impl TestService {
    pub async fn start() -> Self {
        Self::with(Settings::default(), |_| {}).await
    }

    /// Build with custom settings and backend overrides, then wait until every
    /// consumer holds its subscription
    pub async fn with(settings: Settings, customize: impl FnOnce(&mut Backends)) -> Self {
        let channel = Arc::new(MemoryChannel::new());
        let mut backends = Backends::memory(&settings);
        backends.channel = channel.clone();
        customize(&mut backends);

        let state = AppState::with_backends(settings, backends);
        let app = create_app(state.clone());
        let service = Self {
            state,
            channel,
            app,
        };
        service.wait_for_consumers().await;
        service
    }

    async fn wait_for_consumers(&self) {
        let expected = [
            (Topic::BookBorrowed, 2),
            (Topic::BookReturned, 2),
            (Topic::UserDeleted, 1),
            (Topic::BookAdded, 2),
            (Topic::BookUpdated, 2),
        ];
        let channel = self.channel.clone();
        eventually(move || {
            let channel = channel.clone();
            async move {
                expected
                    .iter()
                    .all(|(topic, count)| channel.subscriber_count(*topic) >= *count)
            }
        })
        .await;
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

/// Poll `check` until it holds; panics after two seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

pub fn category_body(category_id: &str, category_name: &str, name: &str) -> Value {
    serde_json::json!({
        "categoryId": category_id,
        "categoryName": category_name,
        "userEmail": format!("{}@example.com", name.to_lowercase()),
        "userName": name,
    })
}

pub fn book_subscription_body(book_id: &str, book_title: &str, name: &str) -> Value {
    serde_json::json!({
        "bookId": book_id,
        "bookTitle": book_title,
        "userEmail": format!("{}@example.com", name.to_lowercase()),
        "userName": name,
    })
}

pub fn new_book_body(book_id: &str, title: &str, category: &str, total: i32) -> Value {
    serde_json::json!({
        "bookId": book_id,
        "title": title,
        "author": "Carl Sagan",
        "category": category,
        "totalCopies": total,
    })
}
