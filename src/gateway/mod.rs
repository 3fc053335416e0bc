//! Gateway binary's shared application state and router (spec.md §2, §6).

pub mod handlers;
pub mod orchestrator;
pub mod reaper;
pub mod relay;
pub mod types;

#[cfg(test)]
mod proptests;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::auth::TenantProvider;
use crate::coordination::CoordinationStore;

pub use orchestrator::Orchestrator;

pub struct AppState {
    pub store: Arc<dyn CoordinationStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub worker_port: u16,
}

pub fn create_router(state: Arc<AppState>, auth_provider: Arc<dyn TenantProvider>) -> Router {
    let session_routes = Router::new()
        .route("/sessions", post(handlers::create_session).get(handlers::list_sessions))
        .route("/sessions/:id", delete(handlers::delete_session))
        .layer(axum::middleware::from_fn_with_state(
            auth_provider,
            crate::auth::tenant_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/session/:id", get(handlers::session_ws))
        .route("/healthz", get(handlers::healthz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .merge(session_routes)
}
