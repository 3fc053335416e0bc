//! Gateway REST + WebSocket handlers (spec.md §6).

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::ids::{SessionId, TenantId};

use super::orchestrator::GatewayError;
use super::types::{CreateSessionRequest, CreateSessionResponse, ListSessionsResponse, StatusResponse};
use super::AppState;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::WorkerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    tenant_id: axum::extract::Extension<TenantId>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if payload.record {
        tracing::debug!("recording requested but not supported");
    }

    let outcome = state
        .orchestrator
        .create_session(tenant_id.0, payload.client_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: outcome.session_id,
            connect_url: outcome.connect_url,
        }),
    ))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    tenant_id: axum::extract::Extension<TenantId>,
) -> Result<impl IntoResponse, GatewayError> {
    let sessions = state.orchestrator.list_sessions(tenant_id.0).await?;
    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<impl IntoResponse, GatewayError> {
    state.orchestrator.close_session(session_id).await?;
    Ok(Json(StatusResponse { status: "closed" }))
}

pub async fn session_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        super::relay::handle_client_socket(
            socket,
            session_id,
            state.store.clone(),
            state.orchestrator.clone(),
            state.worker_port,
        )
        .await;
    })
}

pub async fn healthz() -> impl IntoResponse {
    Json(StatusResponse { status: "ok" })
}

pub async fn version() -> impl IntoResponse {
    concat!("browser-gateway ", env!("CARGO_PKG_VERSION"))
}
