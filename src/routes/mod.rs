use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod game;
pub mod health;
pub mod sse;

/// Compose the device API, the view stream and the documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(health::router())
        .merge(game::router())
        .merge(sse::router())
        .merge(docs::router(state.clone()))
        .with_state(state)
}
