//! HTTP liveness endpoint.
//!
//! `GET /health` answers 200 while the database responds to a trivial query
//! and 503 otherwise. The server owns signal handling: on Ctrl-C or SIGTERM
//! it stops accepting requests, drains in-flight ones, and closes the store.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use hearth_core::{lifecycle, Store};
use log::info;
use serde::Serialize;
use tokio::net::TcpListener;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    database: bool,
}

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(store)
}

async fn health(State(store): State<Store>) -> (StatusCode, Json<HealthBody>) {
    if store.health().await {
        (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                database: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: "unavailable",
                database: false,
            }),
        )
    }
}

/// Serves until a shutdown signal arrives (or forever, when
/// `handle_signals` is false), then closes the store.
pub async fn serve(store: Store, addr: SocketAddr, handle_signals: bool) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", listener.local_addr()?);

    let app = router(store.clone());
    if handle_signals {
        axum::serve(listener, app)
            .with_graceful_shutdown(lifecycle::shutdown_signal())
            .await
            .context("HTTP server failed")?;
    } else {
        axum::serve(listener, app)
            .await
            .context("HTTP server failed")?;
    }

    store.close().await.context("Failed to close database")?;
    info!("Database closed");
    Ok(())
}
