use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::server::AppState;

use super::audit::recent_fanouts;
use super::books::{add_book, get_book, update_book};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::notifications::{
    delete_notification, list_notifications, mark_all_read, mark_read, unread_count,
};
use super::subscriptions::{
    book_subscribers, category_subscribers, list_user_subscriptions, preview_targets,
    subscribe_book, subscribe_category, unsubscribe_book, unsubscribe_category,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Subscriptions
                .route(
                    "/users/{user_id}/subscriptions",
                    get(list_user_subscriptions),
                )
                .route(
                    "/users/{user_id}/subscriptions/categories",
                    post(subscribe_category),
                )
                .route(
                    "/users/{user_id}/subscriptions/categories/{category_id}",
                    delete(unsubscribe_category),
                )
                .route(
                    "/users/{user_id}/subscriptions/books",
                    post(subscribe_book),
                )
                .route(
                    "/users/{user_id}/subscriptions/books/{book_id}",
                    delete(unsubscribe_book),
                )
                .route(
                    "/categories/{category_name}/subscribers",
                    get(category_subscribers),
                )
                .route("/books/{book_id}/subscribers", get(book_subscribers))
                .route("/targets", get(preview_targets))
                // Notifications
                .route(
                    "/users/{user_id}/notifications",
                    get(list_notifications),
                )
                .route(
                    "/users/{user_id}/notifications/unread-count",
                    get(unread_count),
                )
                .route(
                    "/users/{user_id}/notifications/read-all",
                    patch(mark_all_read),
                )
                .route(
                    "/users/{user_id}/notifications/{id}/read",
                    patch(mark_read),
                )
                .route(
                    "/users/{user_id}/notifications/{id}",
                    delete(delete_notification),
                )
                // Catalog producer
                .route("/books", post(add_book))
                .route("/books/{book_id}", get(get_book).put(update_book))
                // Fan-out audit
                .route("/audit", get(recent_fanouts)),
        )
}
