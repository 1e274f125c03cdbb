use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hashring_router::{
    DockerSupervisor, LoadBalancer, LocalSupervisor, RouterConfig, SupervisorKind,
    WorkerSupervisor,
    web::{AppState, build_router},
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RouterConfig::parse();
    config
        .validate()
        .context("invalid router configuration")?;

    let supervisor: Arc<dyn WorkerSupervisor> = match config.supervisor {
        SupervisorKind::Local => {
            info!("worker supervisor: local");
            Arc::new(
                LocalSupervisor::new(config.request_timeout_duration())
                    .context("failed to create local supervisor")?,
            )
        }
        SupervisorKind::Docker => {
            info!(image = %config.worker_image, network = %config.worker_network, "worker supervisor: docker");
            Arc::new(
                DockerSupervisor::new(config.docker_settings())
                    .context("failed to create docker supervisor")?,
            )
        }
    };

    let balancer = LoadBalancer::new(&config, supervisor).context("failed to build router")?;
    let boot = balancer
        .scaling()
        .bootstrap(config.initial_replicas)
        .await
        .context("failed to start initial replicas")?;
    if !boot.is_complete() {
        warn!(failed = ?boot.failed, "some initial replicas did not start");
    }
    info!(replicas = ?boot.replicas.replicas, "initial replica pool ready");

    let app = build_router(AppState::from(&balancer));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "router started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let drained = balancer.scaling().drain().await;
    info!(stopped = drained.changed.len(), "router stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hashring_router=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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
