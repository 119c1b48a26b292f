//! Station Quest Back binary entrypoint wiring REST, SSE, device storage and
//! the shared store supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::{AppConfig, StoreBackend};
use dao::{
    doc_store::{DocumentStore, memory::MemoryDocumentStore},
    local_store::FileLocalStore,
    storage::StorageError,
};
use services::{game_service, storage_supervisor};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let backend = config.store_backend();
    let local_store = Arc::new(FileLocalStore::new(config::state_path()));
    let (app_state, remote_events) = AppState::restore(config.into_catalog(), local_store).await;

    tokio::spawn(game_service::run_remote_events(
        app_state.clone(),
        remote_events,
    ));
    tokio::spawn(game_service::run_status_updates(app_state.clone()));
    spawn_store_supervisor(app_state.clone(), backend)?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the supervisor for the configured shared store. Without one the
/// device stays offline and plays locally.
fn spawn_store_supervisor(state: SharedState, backend: StoreBackend) -> anyhow::Result<()> {
    match backend {
        StoreBackend::Offline => {
            info!("no shared store configured; playing locally");
        }
        StoreBackend::Memory => {
            info!("using the in-process shared store");
            let store = MemoryDocumentStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move {
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn DocumentStore>)
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch { base_url, database } => {
            use dao::doc_store::couchdb::{CouchConfig, CouchDocumentStore};

            let couch_config = CouchConfig::resolve(base_url, database);
            info!(
                base_url = %couch_config.base_url,
                database = %couch_config.database,
                "using CouchDB shared store"
            );
            tokio::spawn(storage_supervisor::run(state, move || {
                let couch_config = couch_config.clone();
                async move {
                    let store = CouchDocumentStore::connect(couch_config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn DocumentStore>)
                }
            }));
        }
        #[cfg(not(feature = "couch-store"))]
        StoreBackend::Couch { .. } => {
            anyhow::bail!("CouchDB store requested but the `couch-store` feature is disabled");
        }
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
