// src/server.rs

//! Startup and shutdown of the relay process.

use crate::{
    config::{Config, ConfigError},
    database::RoomStore,
    error::AppError,
    registry::RoomRegistry,
    router::build_router,
    state::AppState,
};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] AppError),

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("serve error: {0}")]
    Serve(std::io::Error),
}

/// Opens the store, binds the listener and serves until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let store = RoomStore::connect(&config.database_url).await?;
    let registry = RoomRegistry::new(config.rooms.clone());
    let state = AppState::new(registry, store.clone(), config.connections.clone());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "grid relay listening");

    serve(listener, state, shutdown_signal()).await?;

    store.close().await;
    info!("grid relay stopped");
    Ok(())
}

/// Serves `state` on `listener` until `shutdown` resolves. Rooms are closed
/// before the HTTP server drains, so connected editors get a close frame.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown requested, closing rooms");
            registry.shutdown().await;
        })
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
