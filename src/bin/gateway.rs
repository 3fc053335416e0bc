//! Gateway binary: stateless REST + CDP relay front-end (spec.md §2).

use std::path::PathBuf;
use std::sync::Arc;

use browser_gateway::auth::{JwtProvider, LocalProvider, TenantProvider};
use browser_gateway::config::{AuthProviderKind, GatewayConfig};
use browser_gateway::coordination::{CoordinationStore, RedisCoordinationStore};
use browser_gateway::db::Database;
use browser_gateway::gateway::{create_router, reaper, AppState, Orchestrator};
use tower_http::cors::{Any, CorsLayer};
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

    let config = GatewayConfig::from_env();

    if let Some(parent) = PathBuf::from(&config.database_url).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.database_url, "opening relational store");
    let db = Database::open(&config.database_url)?;

    tracing::info!(url = %config.redis_url, "connecting to coordination store");
    let store: Arc<dyn CoordinationStore> =
        Arc::new(RedisCoordinationStore::connect(&config.redis_url).await?);

    let auth_provider: Arc<dyn TenantProvider> = match config.auth_provider {
        AuthProviderKind::Jwt => {
            let pem = config
                .jwt_public_key
                .as_deref()
                .ok_or("AUTH_PROVIDER=jwt requires JWT_PUBLIC_KEY")?;
            Arc::new(JwtProvider::from_rsa_pem(pem.as_bytes())?)
        }
        AuthProviderKind::Local => {
            tracing::warn!("using local auth provider; every request resolves to the nil tenant");
            Arc::new(LocalProvider)
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        store.clone(),
        config.public_gateway_host.clone(),
        config.worker_port,
    ));

    let state = Arc::new(AppState {
        store: store.clone(),
        orchestrator: orchestrator.clone(),
        worker_port: config.worker_port,
    });

    let reaper_handle = reaper::spawn(
        db,
        store,
        orchestrator,
        config.idle_timeout,
        config.session_timeout,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state, auth_provider)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.gateway_port));
    tracing::info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
