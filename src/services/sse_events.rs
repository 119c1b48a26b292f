use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        sse::{ServerEvent, StatusEvent},
        view::{DeviceView, status_label},
    },
    services::sync_service::SyncStatus,
    state::SharedState,
};

const EVENT_VIEW: &str = "view";
const EVENT_STATUS: &str = "status";

/// Broadcast the full device view.
pub fn broadcast_view(state: &SharedState, view: &DeviceView) {
    send_view_event(state, EVENT_VIEW, view);
}

/// Broadcast a connectivity change.
pub fn broadcast_status(state: &SharedState, status: SyncStatus) {
    let payload = StatusEvent {
        status,
        label: status_label(status).to_string(),
    };
    send_view_event(state, EVENT_STATUS, &payload);
}

fn send_view_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.view_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize view SSE payload"),
    }
}
