//! sqlmon server binary.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlmon::services::{IntervalTicker, Scheduler};
use sqlmon::{api, config, AppState, Error, Result};

/// Upper bound for one request, including a manually triggered cycle.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sqlmon=debug,sqlmon_ai=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.server.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Starting sqlmon on {}:{}",
        config.server.host,
        config.server.port
    );

    let cancel = CancellationToken::new();

    let state = AppState::new(cancel.clone()).await?;
    tracing::info!("Application state initialized");

    let scheduler = Scheduler::new(
        state.monitor.clone(),
        IntervalTicker::new(config.monitoring.interval),
        cancel.clone(),
    )
    .spawn();
    tracing::info!(
        interval_secs = config.monitoring.interval.as_secs(),
        "Detection scheduler started"
    );

    let app = Router::new()
        .merge(api::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::InvalidInput(format!("Invalid listen address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    let cycles = scheduler.shutdown().await;
    tracing::info!(cycles, "sqlmon stopped");

    Ok(())
}
