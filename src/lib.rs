// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Domain layer (business logic)
pub mod catalog;
pub mod channel;
pub mod email;
pub mod notification;
pub mod projector;
pub mod push;
pub mod subscription;
pub mod targeting;

// Application layer
pub mod api;
pub mod consumers;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
