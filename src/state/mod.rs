pub mod actions;
pub mod allocator;
pub mod catalog;
pub mod device;
pub mod reconcile;
pub mod remote;
pub mod session;
mod sse;
pub mod trivia;

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::{
    dao::local_store::LocalStore,
    services::sync_service::{RemoteEvents, SyncAdapter},
    state::{catalog::Catalog, device::DeviceSession, session::LocalSession},
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const VIEW_SSE_CAPACITY: usize = 32;

/// The device session together with the random source its turns draw from.
pub struct DeviceRuntime {
    pub device: DeviceSession,
    pub rng: StdRng,
}

/// Central application state: the one device this process coordinates.
///
/// Every turn (player action or store delivery) runs while holding the
/// device lock, so turns never interleave.
pub struct AppState {
    catalog: Arc<Catalog>,
    runtime: Mutex<DeviceRuntime>,
    sync: SyncAdapter,
    local_store: Arc<dyn LocalStore>,
    view_sse: SseHub,
}

impl AppState {
    /// Build the state from a raw persisted session, if any.
    ///
    /// The adapter starts offline; the returned receiver yields its deliveries.
    pub fn new(
        catalog: Catalog,
        local_store: Arc<dyn LocalStore>,
        raw_session: Option<&str>,
        rng: StdRng,
    ) -> (SharedState, RemoteEvents) {
        let catalog = Arc::new(catalog);
        let session = LocalSession::restore(raw_session, &catalog);
        let (sync, events) = SyncAdapter::new(catalog.clone());
        let state = Arc::new(Self {
            runtime: Mutex::new(DeviceRuntime {
                device: DeviceSession::new(session),
                rng,
            }),
            catalog,
            sync,
            local_store,
            view_sse: SseHub::new(VIEW_SSE_CAPACITY),
        });
        (state, events)
    }

    /// Load the persisted session from `local_store` and build the state.
    pub async fn restore(
        catalog: Catalog,
        local_store: Arc<dyn LocalStore>,
    ) -> (SharedState, RemoteEvents) {
        let raw = match local_store.load().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to load local session; starting fresh");
                None
            }
        };
        if raw.is_some() {
            info!("restoring local session");
        }
        Self::new(catalog, local_store, raw.as_deref(), StdRng::from_os_rng())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sync(&self) -> &SyncAdapter {
        &self.sync
    }

    /// Broadcast hub used for the view SSE stream.
    pub fn view_sse(&self) -> &SseHub {
        &self.view_sse
    }

    /// Start a turn.
    pub async fn lock_device(&self) -> MutexGuard<'_, DeviceRuntime> {
        self.runtime.lock().await
    }

    /// Write the session to device storage. Failures are logged; play goes on.
    pub async fn persist(&self, session: &LocalSession) {
        let raw = match session.to_json() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to serialize local session");
                return;
            }
        };
        if let Err(err) = self.local_store.save(raw).await {
            warn!(error = %err, "failed to persist local session");
        }
    }
}
