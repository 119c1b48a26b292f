use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{doc_store::DocumentStore, storage::StorageError},
    services::sync_service::SyncStatus,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_HEALTH_RETRIES: u32 = 3;

/// Keep a shared store installed in the sync adapter, reconnecting with
/// backoff. While none is reachable the device plays locally.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DocumentStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        state.sync().set_status(SyncStatus::Connecting);
        match connect().await {
            Ok(store) => {
                state.sync().install_store(store.clone()).await;
                info!("shared store connected; syncing");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;

                warn!("shared store lost; playing locally until it comes back");
                state.sync().clear_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "shared store connection attempt failed");
                state.sync().set_status(SyncStatus::Offline);
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store until it stays unhealthy through every retry.
async fn watch_health(state: &SharedState, store: &dyn DocumentStore) {
    loop {
        sleep(HEALTH_POLL_INTERVAL).await;
        if store.health_check().await.is_ok() {
            continue;
        }

        let mut attempt = 0;
        let mut retry_delay = INITIAL_DELAY;
        let mut recovered = false;
        while attempt < MAX_HEALTH_RETRIES {
            match store.health_check().await {
                Ok(()) => {
                    info!("store health check recovered");
                    recovered = true;
                    break;
                }
                Err(err) => {
                    if attempt == 0 {
                        warn!(attempt, error = %err, "store health check failed; flagging sync error");
                        state.sync().set_status(SyncStatus::Error);
                    } else {
                        warn!(attempt, error = %err, "store health check retry failed");
                    }
                    attempt += 1;
                    sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(MAX_DELAY);
                }
            }
        }

        if !recovered {
            return;
        }
        // Feeds flip the status back on their next delivery; do it now in
        // case nothing changes for a while.
        state.sync().set_status(SyncStatus::Connected);
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        dao::{doc_store::memory::MemoryDocumentStore, local_store::MemoryLocalStore},
        state::{AppState, catalog::fixtures},
    };

    #[tokio::test(start_paused = true)]
    async fn unhealthy_store_is_dropped_and_reconnected() {
        let (state, _events) = AppState::new(
            fixtures::catalog(),
            Arc::new(MemoryLocalStore::new()),
            None,
            StdRng::seed_from_u64(7),
        );
        let store = MemoryDocumentStore::new();
        let handle = {
            let store = store.clone();
            tokio::spawn(run(state.clone(), move || {
                let store = store.clone();
                async move {
                    store.health_check().await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn DocumentStore>)
                }
            }))
        };

        sleep(Duration::from_millis(100)).await;
        assert!(state.sync().store().await.is_some());

        store.set_available(false);
        // One poll, then three failed retries with 1s, 2s and 4s pauses.
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(7_500)).await;
        assert!(state.sync().store().await.is_none());

        store.set_available(true);
        sleep(MAX_DELAY).await;
        assert!(state.sync().store().await.is_some());
        handle.abort();
    }
}
