use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    services::{cancel_task, get_task, health, list_tasks, submit_task},
    state::AppState,
};
use crate::config::Config;
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::graph::{GraphClient, HttpConfig};
use crate::observability::Metrics;
use crate::registry::TaskRegistry;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Routes with state and middleware attached
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task).get(list_tasks))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .route("/health", get(health))
        .with_state(state)
        // Transparently decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Build the dispatcher from config and serve until a shutdown signal
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let graph = Arc::new(
        GraphClient::new(HttpConfig::from(&config.graph))
            .map_err(|e| format!("Failed to build Graph client: {e}"))?,
    );
    let registry = Arc::new(TaskRegistry::new());
    let dispatcher = Dispatcher::new(
        registry.clone(),
        graph.clone(),
        graph,
        Arc::new(Metrics::new()),
        DispatchSettings::from(&config),
    );

    let shutdown = CancellationToken::new();
    let pruner = tokio::spawn(prune_loop(
        registry,
        config.retention.ttl(),
        config.retention.prune_interval.as_duration(),
        shutdown.clone(),
    ));

    let state = AppState::new(config, dispatcher.clone());
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "dispatchbox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let flagged = dispatcher.cancel_all().await;
    info!(tasks = flagged, "Cancellation requested for running tasks");
    shutdown.cancel();
    if let Err(err) = pruner.await {
        warn!(error = %err, "Prune loop ended abnormally");
    }

    Ok(())
}

/// Drop finished tasks past their TTL every `interval`
async fn prune_loop(
    registry: Arc<TaskRegistry>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                registry.prune_finished(ttl).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
