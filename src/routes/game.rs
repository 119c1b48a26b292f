use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::{action::ActionRequest, view::DeviceView},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes driving the device: read the view, submit player actions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/view", get(get_view))
        .route("/api/actions", post(post_action))
}

/// Return what the device currently shows.
#[utoipa::path(
    get,
    path = "/api/view",
    tag = "game",
    responses((status = 200, description = "Current device view", body = DeviceView))
)]
pub async fn get_view(State(state): State<SharedState>) -> Json<DeviceView> {
    Json(game_service::current_view(&state).await)
}

/// Apply one player action and return the resulting view.
#[utoipa::path(
    post,
    path = "/api/actions",
    tag = "game",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action applied", body = DeviceView),
        (status = 400, description = "Malformed action or missing confirmation"),
        (status = 404, description = "Unknown team"),
        (status = 409, description = "Action not possible on the current screen")
    )
)]
pub async fn post_action(
    State(state): State<SharedState>,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<DeviceView>, AppError> {
    payload.validate()?;
    let view = game_service::dispatch(&state, payload.0).await?;
    Ok(Json(view))
}
