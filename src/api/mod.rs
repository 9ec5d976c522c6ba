//! API layer - HTTP endpoint handlers organized by domain.

mod audit;
mod books;
mod extract;
mod health;
mod metrics;
mod notifications;
mod response;
mod routes;
mod subscriptions;

pub use audit::recent_fanouts;
pub use books::{add_book, get_book, update_book};
pub use extract::{ApiJson, ApiQuery};
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use notifications::{
    delete_notification, list_notifications, mark_all_read, mark_read, unread_count,
};
pub use response::ApiResponse;
pub use routes::api_routes;
pub use subscriptions::{
    book_subscribers, category_subscribers, list_user_subscriptions, preview_targets,
    subscribe_book, subscribe_category, unsubscribe_book, unsubscribe_category,
};
