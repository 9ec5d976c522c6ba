//! Live push channel: catalog events mirrored verbatim to open SSE streams.

mod registry;
mod sse;

pub use registry::{BroadcastResult, Frame, PushRegistry, PushStats};
pub use sse::event_stream;
