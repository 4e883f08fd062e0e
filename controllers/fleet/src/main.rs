//! Fleet Controller
//!
//! Runs the per-cluster service and node controllers for every local kind
//! cluster:
//! - Discovers clusters with `kind get clusters` on a fixed interval
//! - Bootstraps an admin client per cluster (host or in-network endpoint)
//! - Starts and stops delegated controllers as clusters come and go
//! - Removes labelled leftover containers on shutdown

mod backoff;
mod bootstrap;
mod config;
mod controller;
mod delegated;
mod error;
mod features;
mod informers;
mod instance;
mod launcher;
mod metrics;
mod probe;
mod reconciler;
mod server;
mod sweeper;
#[cfg(test)]
mod test_utils;

use anyhow::Context;
use config::FleetConfig;
use controller::Controller;
use metrics::FleetMetrics;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Fleet Controller");

    // kube and reqwest both link rustls; pick the provider once for the process
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = FleetConfig::from_env().context("failed to load configuration")?;
    config.log();

    let metrics = FleetMetrics::new().context("failed to register metrics")?;
    let listener = server::bind(config.metrics_addr)
        .await
        .context("failed to start metrics server")?;

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));
    let server = tokio::spawn(server::serve(listener, metrics.clone(), token.clone()));

    let controller = Controller::new(&config, metrics).context("failed to initialize controller")?;
    let report = controller.run(token.clone()).await;

    token.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Metrics server failed: {}", e),
        Err(e) => error!("Metrics server task panicked: {}", e),
    }

    info!(
        "Fleet Controller stopped ({} container(s) removed, {} failure(s))",
        report.deleted, report.failed
    );
    Ok(())
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received terminate signal, shutting down"),
    }

    token.cancel();
}
