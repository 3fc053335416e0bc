//! Worker binary: owns local browser processes for sessions scheduled onto
//! this host (spec.md §2, §4.6, §4.7).

use std::sync::Arc;

use browser_gateway::config::WorkerConfig;
use browser_gateway::coordination::{CoordinationStore, RedisCoordinationStore};
use browser_gateway::ids::WorkerHost;
use browser_gateway::worker::{create_router, AppState, BrowserManager};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_gateway=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = WorkerConfig::from_env();
    let worker_host = WorkerHost::new(config.worker_host.clone());

    tracing::info!(url = %config.redis_url, "connecting to coordination store");
    let store = RedisCoordinationStore::connect(&config.redis_url).await?;

    // spec.md §4.6 "Self-registration": add (workerHost, 0) only if absent.
    store.register_worker_if_absent(&worker_host).await?;
    tracing::info!(host = %worker_host, "registered in the load-ranked worker set");

    let chrome_binary = std::env::var("CHROME_BINARY").unwrap_or_else(|_| "chromium".to_string());
    let browsers = Arc::new(BrowserManager::new(chrome_binary));
    let state = Arc::new(AppState { browsers });

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.bind_addr, config.worker_port);
    tracing::info!(%addr, host = %worker_host, "worker listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(store, worker_host.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(store: RedisCoordinationStore, worker_host: WorkerHost) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received, deregistering from the load set");
    if let Err(e) = store.deregister_worker(&worker_host).await {
        tracing::warn!(error = %e, "failed to deregister worker on shutdown");
    }
}
