//! Per-user notifications: storage, content templates, fan-out and its audit
//! trail.

mod audit;
mod fanout;
mod memory_store;
mod postgres_store;
mod store;
mod template;
mod types;

pub use audit::{AuditLog, FailureStage, FanoutAudit, RecipientFailure};
pub use fanout::{FanoutStats, FanoutStatsSnapshot, NotificationFanout};
pub use memory_store::MemoryNotificationStore;
pub use postgres_store::PostgresNotificationStore;
pub use store::{NotificationStore, NotificationStoreError};
pub use template::{
    escape_html, fill, BorrowTemplate, CatalogTemplate, NotificationTemplate, RenderedEmail,
    RenderedNotification, ReturnTemplate,
};
pub use types::{
    Notification, NotificationPage, NotificationQuery, NotificationType, Priority, Recipient,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
