//! Wire DTOs for the gateway REST surface (spec.md §6).

use serde::{Deserialize, Serialize};

use crate::db::Session;
use crate::ids::SessionId;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Accepted for wire compatibility with the original `record` flag but
    /// never acted on — recording is out of scope (spec.md §1). Logged at
    /// debug level if true.
    #[serde(default)]
    pub record: bool,
    /// Optional free-text label distinct from `tenantId` (which comes from
    /// auth middleware, not the body); carried through from the original's
    /// `NewSessionReq.client_id`.
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub connect_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub tenant_id: String,
    pub worker_id: String,
    pub client_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_active_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: &'static str,
}

impl From<Session> for SessionSummary {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            tenant_id: s.tenant_id.to_string(),
            worker_id: s.worker_id.to_string(),
            client_id: s.client_id,
            created_at: s.created_at,
            last_active_at: s.last_active_at,
            ended_at: s.ended_at,
            status: s.status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}
