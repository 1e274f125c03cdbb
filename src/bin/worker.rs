//! Backend worker process: serves `/home`, `/heartbeat` and `/id`.
//!
//! `SERVER_ID` tags the worker (defaults to `Unknown`), `WORKER_PORT` picks the
//! port (defaults to 5000).

use anyhow::{Context, Result};
use hashring_router::worker::build_worker_router;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_id = env::var("SERVER_ID").unwrap_or_else(|_| "Unknown".to_string());
    let port = env::var("WORKER_PORT")
        .unwrap_or_else(|_| "5000".to_string())
        .parse::<u16>()
        .context("WORKER_PORT must be a valid u16")?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(address = %addr, server_id = %server_id, "worker started");

    axum::serve(listener, build_worker_router(server_id))
        .await
        .context("worker server error")?;
    Ok(())
}
