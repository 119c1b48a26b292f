use serde::Serialize;
use utoipa::ToSchema;

use crate::services::sync_service::SyncStatus;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" while synced with the shared store, "degraded" otherwise.
    pub status: String,
    pub sync: SyncStatus,
}

impl HealthResponse {
    pub fn from_sync(sync: SyncStatus) -> Self {
        let status = match sync {
            SyncStatus::Connected | SyncStatus::Connecting => "ok",
            SyncStatus::Error | SyncStatus::Offline => "degraded",
        };
        Self {
            status: status.to_string(),
            sync,
        }
    }
}
