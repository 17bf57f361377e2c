use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use crate::api;
use crate::config::Config;
use crate::state::SharedState;

/// Runs the API until Ctrl+C, then drains in-flight requests and tears the
/// shared state down.
pub async fn cmd_serve(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "staffgate starting"
    );

    let shared = Arc::new(SharedState::new(config).await?);

    if let Err(e) = shared.scheduler.start().await {
        error!(error = %e, "Failed to start scheduler");
    }

    let server = &shared.config.server;
    if server.enabled {
        let addr = format!("{}:{}", server.bind_address, server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let app = api::router(api::create_app_state(shared.clone(), prometheus_handle));

        info!(address = %addr, "HTTP server listening");

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Err(e) = served {
            error!(error = %e, "HTTP server error");
        }
    } else {
        info!("HTTP server disabled, running background jobs only");
        shutdown_signal().await;
    }

    shared.shutdown().await?;
    info!("staffgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Error listening for shutdown"),
    }
}
