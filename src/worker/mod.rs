//! Worker binary's shared application state and router (spec.md §2, §6).

pub mod browser_manager;
pub mod handlers;
pub mod relay;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

pub use browser_manager::BrowserManager;

pub struct AppState {
    pub browsers: Arc<BrowserManager>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/browser", post(handlers::new_browser))
        .route("/browser/:id", delete(handlers::close_browser))
        .route("/proxy/:id", get(handlers::proxy_ws))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
