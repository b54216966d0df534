//! # usde-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the USDE back office and the
//! background sweeper, and shuts both down on Ctrl-C or SIGTERM.

use std::sync::Arc;

use tokio::signal;
use usde_api::bootstrap::{bootstrap, Bootstrapped};
use usde_api::config::AppConfig;
use usde_api::middleware::tracing_layer;
use usde_api::services::sweeper::Sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    tracing_layer::init(config.log_format);

    if config.jwt_secret.is_ephemeral() {
        tracing::warn!("JWT_SECRET not set; tokens are signed with a per-process secret");
    }
    tracing::info!(?config, "configuration loaded");

    let port = config.port;
    let sweep_interval = config.sweep_interval;
    let Bootstrapped { state, pool } = bootstrap(config).await.map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    let sweeper = Sweeper::spawn(Arc::clone(&state.store), sweep_interval);
    let app = usde_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("USDE API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("database pool closed");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
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

    tracing::warn!("shutdown signal received");
}
