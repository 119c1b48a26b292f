use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/view",
    tag = "sse",
    responses((status = 200, description = "Device view stream (`view` and `status` events)", content_type = "text/event-stream", body = String))
)]
/// Stream the device view and sync status as they change.
pub async fn view_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (replay, receiver) = sse_service::subscribe_view(&state);
    info!(replayed = replay.len(), "New view SSE connection");
    sse_service::to_sse_stream(replay, receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/view", get(view_stream))
}
