//! Worker RPC handlers invoked by the gateway (spec.md §4.6, §6).

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

use super::browser_manager::BrowserError;
use super::AppState;

impl IntoResponse for BrowserError {
    fn into_response(self) -> Response {
        let status = match &self {
            BrowserError::PortAllocation(_) | BrowserError::LaunchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BrowserError::DiscoveryTimeout => StatusCode::GATEWAY_TIMEOUT,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewBrowserRequest {
    session_id: String,
}

#[derive(Debug, Serialize)]
pub struct NewBrowserResponse {
    #[serde(rename = "browserId")]
    browser_id: String,
    port: u16,
}

pub async fn new_browser(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBrowserRequest>,
) -> Result<impl IntoResponse, BrowserError> {
    let session_id: SessionId = payload
        .session_id
        .parse()
        .map_err(|_| BrowserError::LaunchFailed("malformed session id".into()))?;

    let (port, browser_guid) = state.browsers.new_browser(session_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(NewBrowserResponse {
            browser_id: browser_guid,
            port,
        }),
    ))
}

pub async fn close_browser(State(state): State<Arc<AppState>>, Path(session_id): Path<SessionId>) -> impl IntoResponse {
    state.browsers.close_browser(session_id).await;
    Json(StatusResponse { status: "closed" })
}

pub async fn proxy_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        super::relay::handle_proxy_socket(socket, session_id, state.browsers.clone()).await;
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        sessions: state.browsers.session_count().await,
    })
}
