//! Background reaper enforcing idle and absolute timeouts (spec.md §4.5).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::coordination::CoordinationStore;
use crate::db::Database;
use crate::ids::SessionId;

use super::orchestrator::Orchestrator;

const PASS_INTERVAL: Duration = Duration::from_secs(30);

/// Starts the reaper loop as a background task, returning its `JoinHandle`
/// so callers can cancel it at shutdown (grounded on the teacher's
/// `BrowserSessionManager::new()` weak-reference cleanup-task pattern).
pub fn spawn(
    db: Database,
    store: Arc<dyn CoordinationStore>,
    orchestrator: Arc<Orchestrator>,
    idle_timeout: Duration,
    session_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(PASS_INTERVAL).await;
            run_pass(&db, &store, &orchestrator, idle_timeout, session_timeout).await;
        }
    })
}

async fn run_pass(
    db: &Database,
    store: &Arc<dyn CoordinationStore>,
    orchestrator: &Arc<Orchestrator>,
    idle_timeout: Duration,
    session_timeout: Duration,
) {
    let idle_cutoff = chrono::Utc::now().timestamp() - idle_timeout.as_secs() as i64;

    let idle: Vec<SessionId> = match store.idle_session_ids(idle_cutoff).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(error = %e, "reaper: idle scan failed, skipping pass");
            return;
        }
    };

    let absolute: Vec<SessionId> = match db.active_sessions_older_than(ChronoDuration::seconds(session_timeout.as_secs() as i64)) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(error = %e, "reaper: absolute-age scan failed, skipping pass");
            return;
        }
    };

    // Both sets are already canonical UUID-string-backed `SessionId`s (no
    // mixed representations to normalize, unlike the original's string/UUID
    // union ambiguity — see SPEC_FULL.md §9).
    let mut to_close: BTreeSet<SessionId> = BTreeSet::new();
    to_close.extend(idle);
    to_close.extend(absolute);

    for session_id in to_close {
        if let Err(e) = orchestrator.close_session(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "reaper: failed to close session");
        }
    }
}
