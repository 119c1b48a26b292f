use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report sync connectivity, probing the store when one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.sync().store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "store health check failed");
            }
        }
        None => warn!("no shared store installed (local only)"),
    }

    HealthResponse::from_sync(state.sync().status())
}
