//! `GET /api/v1/events/stream`: catalog events as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::registry::{Frame, PushRegistry};
use crate::infrastructure::error::AppError;
use crate::server::AppState;

#[tracing::instrument(name = "sse.connect", skip(state))]
pub async fn event_stream(State(state): State<AppState>) -> Response {
    let Some((connection_id, rx)) = state.push.register() else {
        return AppError::Unavailable("server is shutting down".into()).into_response();
    };

    tracing::info!(connection_id = %connection_id, "Push stream opened");

    let keep_alive = Duration::from_secs(state.settings.push.keep_alive_interval.max(1));
    Sse::new(frame_stream(rx, connection_id, state.push.clone()))
        .keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive"))
        .into_response()
}

fn frame_stream(
    rx: mpsc::Receiver<Frame>,
    connection_id: Uuid,
    registry: Arc<PushRegistry>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = CleanupGuard {
        connection_id,
        registry,
        opened: Instant::now(),
    };
    let mut frames = ReceiverStream::new(rx);

    async_stream::stream! {
        let _guard = guard;
        yield Ok(Event::default().comment("connected"));

        while let Some(frame) = frames.next().await {
            yield Ok(Event::default().data(&*frame));
        }
    }
}

/// Unregisters the stream when the client goes away and axum drops it
struct CleanupGuard {
    connection_id: Uuid,
    registry: Arc<PushRegistry>,
    opened: Instant,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.connection_id);
        tracing::info!(
            connection_id = %self.connection_id,
            duration_secs = self.opened.elapsed().as_secs_f64(),
            "Push stream closed"
        );
    }
}
