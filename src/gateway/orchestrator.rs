//! Gateway session orchestration: create / list / close (spec.md §4.2, §4.3).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordination::{CoordinationStore, RegistryError, SessionDetail};
use crate::db::{Database, DbError, Session};
use crate::ids::{SessionId, TenantId, WorkerHost};
use crate::scheduler::Scheduler;

const WORKER_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no worker capacity available")]
    NoCapacity,
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("transient store error: {0}")]
    Transient(String),
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        GatewayError::Transient(e.to_string())
    }
}

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        GatewayError::Transient(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct NewBrowserRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct NewBrowserResponse {
    #[serde(rename = "browserId")]
    browser_id: String,
    port: u16,
}

pub struct CreateSessionOutcome {
    pub session_id: SessionId,
    pub connect_url: String,
}

/// Implements spec.md §4.2/§4.3: the ordered, compensating-action-aware
/// session lifecycle operations shared by every REST handler, the relay's
/// teardown path, and the reaper.
pub struct Orchestrator {
    db: Database,
    store: Arc<dyn CoordinationStore>,
    scheduler: Scheduler,
    http: reqwest::Client,
    public_gateway_host: String,
    worker_port: u16,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        store: Arc<dyn CoordinationStore>,
        public_gateway_host: String,
        worker_port: u16,
    ) -> Self {
        let scheduler = Scheduler::new(store.clone());
        Self {
            db,
            store,
            scheduler,
            http: reqwest::Client::new(),
            public_gateway_host,
            worker_port,
        }
    }

    fn worker_base_url(&self, worker: &WorkerHost) -> String {
        format!("http://{}:{}", worker.as_str(), self.worker_port)
    }

    /// spec.md §4.2 `createSession`.
    pub async fn create_session(
        &self,
        tenant_id: TenantId,
        client_id: Option<String>,
    ) -> Result<CreateSessionOutcome, GatewayError> {
        let session_id = SessionId::generate();

        // Step 2: pick a worker.
        let worker = self
            .scheduler
            .pick_worker(None)
            .await?
            .ok_or(GatewayError::NoCapacity)?;

        // Step 3: RPC the worker to launch a browser process.
        let new_browser = match self.request_new_browser(&worker, session_id).await {
            Ok(resp) => resp,
            Err(e) => {
                self.scheduler.decrement_worker_load(&worker).await?;
                return Err(GatewayError::WorkerUnavailable(e));
            }
        };

        // Step 4: persist the relational row; on failure, unwind the
        // worker-side browser and the load increment.
        let inserted = self.db.insert_session(
            session_id,
            tenant_id,
            &worker,
            client_id.as_deref(),
        );
        if let Err(e) = inserted {
            self.request_close_browser(&worker, session_id).await;
            self.scheduler.decrement_worker_load(&worker).await?;
            return Err(GatewayError::from(e));
        }

        // Step 5: write routing/detail/activity entries.
        let now_epoch = chrono::Utc::now().timestamp();
        self.store
            .record_session(
                session_id,
                &worker,
                SessionDetail {
                    browser_guid: new_browser.browser_id,
                    port: new_browser.port,
                },
                now_epoch,
            )
            .await?;

        let connect_url = format!(
            "ws://{}/session/{}",
            self.public_gateway_host, session_id
        );

        Ok(CreateSessionOutcome { session_id, connect_url })
    }

    /// spec.md §4.2 `listSessions`.
    pub async fn list_sessions(&self, tenant_id: TenantId) -> Result<Vec<Session>, GatewayError> {
        Ok(self.db.list_sessions(tenant_id)?)
    }

    /// spec.md §4.3 close protocol. Idempotent and safe under concurrent
    /// invocation from the DELETE handler, either relay pump's teardown
    /// path, and the reaper.
    pub async fn close_session(&self, session_id: SessionId) -> Result<(), GatewayError> {
        // Step 1: read-and-delete the routing entry.
        let Some(worker) = self.store.take_routing(session_id).await? else {
            return Ok(());
        };

        // Step 2: best-effort worker teardown, never aborts the protocol.
        self.request_close_browser(&worker, session_id).await;

        // Step 3: compensating decrement.
        if let Err(e) = self.scheduler.decrement_worker_load(&worker).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to decrement worker load");
        }

        // Step 4: clear detail + activity entries.
        if let Err(e) = self.store.clear_volatile_entries(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to clear volatile entries");
        }

        // Step 5: relational close, last so a crash before this point still
        // leaves a row the reaper can converge on.
        if let Err(e) = self.db.close_session(session_id) {
            tracing::warn!(session_id = %session_id, error = %e, "failed to close relational row");
        }

        Ok(())
    }

    async fn request_new_browser(
        &self,
        worker: &WorkerHost,
        session_id: SessionId,
    ) -> Result<NewBrowserResponse, String> {
        let url = format!("{}/browser", self.worker_base_url(worker));
        let sid = session_id.to_string();
        let resp = tokio::time::timeout(
            WORKER_RPC_TIMEOUT,
            self.http.post(&url).json(&NewBrowserRequest { session_id: &sid }).send(),
        )
        .await
        .map_err(|_| "worker RPC timed out".to_string())?
        .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("worker returned {}", resp.status()));
        }
        resp.json::<NewBrowserResponse>().await.map_err(|e| e.to_string())
    }

    /// Best-effort: failures are logged, never propagated (spec.md §4.3
    /// step 2, §7 propagation policy).
    async fn request_close_browser(&self, worker: &WorkerHost, session_id: SessionId) {
        let url = format!("{}/browser/{}", self.worker_base_url(worker), session_id);
        let result = tokio::time::timeout(WORKER_RPC_TIMEOUT, self.http.delete(&url).send()).await;
        match result {
            Ok(Ok(resp)) if !resp.status().is_success() => {
                tracing::warn!(session_id = %session_id, status = %resp.status(), "worker close returned non-success");
            }
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "worker close request failed");
            }
            Err(_) => {
                tracing::warn!(session_id = %session_id, "worker close request timed out");
            }
            Ok(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    fn orchestrator_with(store: Arc<dyn CoordinationStore>) -> Orchestrator {
        Orchestrator::new(Database::open_in_memory().unwrap(), store, "localhost:8000".into(), 5000)
    }

    #[tokio::test]
    async fn close_session_without_routing_entry_is_a_noop() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let orch = orchestrator_with(store);
        orch.close_session(SessionId::generate()).await.unwrap();
    }

    #[tokio::test]
    async fn list_sessions_is_empty_for_unknown_tenant() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let orch = orchestrator_with(store);
        let sessions = orch.list_sessions(TenantId::NIL).await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn create_session_without_any_worker_fails_with_no_capacity() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let orch = orchestrator_with(store);
        let err = orch.create_session(TenantId::NIL, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoCapacity));
    }
}
