//! In-process fake `CoordinationStore`, used by scheduler/orchestrator/
//! reaper unit tests so they run without a live Redis (grounded on the
//! teacher's `runtime/testing.rs` fake-adapter pattern).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ids::{SessionId, WorkerHost};

use super::{CoordinationStore, RegistryError, SessionDetail};

#[derive(Default)]
struct State {
    /// worker -> load score. A `BTreeMap` keyed by host string gives the
    /// same lexicographic tie-break the real sorted-set's `ZRANGE` provides.
    load: BTreeMap<String, i64>,
    routing: BTreeMap<String, String>,
    detail: BTreeMap<String, SessionDetail>,
    activity: BTreeMap<String, i64>,
}

pub struct InMemoryCoordinationStore {
    state: Mutex<State>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Test helper: current load score for a worker, 0 if unknown.
    pub fn load_of(&self, worker: &WorkerHost) -> i64 {
        self.state
            .lock()
            .unwrap()
            .load
            .get(worker.as_str())
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn pick_worker(&self, max_load: Option<i64>) -> Result<Option<WorkerHost>, RegistryError> {
        let mut state = self.state.lock().unwrap();
        let picked = state
            .load
            .iter()
            .min_by_key(|(host, load)| (**load, (*host).clone()))
            .map(|(host, load)| (host.clone(), *load));

        let Some((host, load)) = picked else {
            return Ok(None);
        };
        if let Some(max) = max_load {
            if load >= max {
                return Ok(None);
            }
        }
        *state.load.get_mut(&host).unwrap() += 1;
        Ok(Some(WorkerHost::new(host)))
    }

    async fn decrement_worker_load(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        *state.load.entry(worker.as_str().to_string()).or_insert(0) -= 1;
        Ok(())
    }

    async fn register_worker_if_absent(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.load.entry(worker.as_str().to_string()).or_insert(0);
        Ok(())
    }

    async fn deregister_worker(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.load.remove(worker.as_str());
        Ok(())
    }

    async fn record_session(
        &self,
        session_id: SessionId,
        worker: &WorkerHost,
        detail: SessionDetail,
        now_epoch: i64,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        let sid = session_id.to_string();
        state.routing.insert(sid.clone(), worker.as_str().to_string());
        state.detail.insert(sid.clone(), detail);
        state.activity.insert(sid, now_epoch);
        Ok(())
    }

    async fn get_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .routing
            .get(&session_id.to_string())
            .cloned()
            .map(WorkerHost::new))
    }

    async fn get_detail(&self, session_id: SessionId) -> Result<Option<SessionDetail>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state.detail.get(&session_id.to_string()).cloned())
    }

    async fn touch_activity(&self, session_id: SessionId, now_epoch: i64) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.activity.insert(session_id.to_string(), now_epoch);
        Ok(())
    }

    async fn take_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.routing.remove(&session_id.to_string()).map(WorkerHost::new))
    }

    async fn clear_volatile_entries(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        let sid = session_id.to_string();
        state.detail.remove(&sid);
        state.activity.remove(&sid);
        Ok(())
    }

    async fn idle_session_ids(&self, idle_cutoff_epoch: i64) -> Result<Vec<SessionId>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .activity
            .iter()
            .filter(|(_, score)| **score <= idle_cutoff_epoch)
            .filter_map(|(sid, _)| sid.parse().ok())
            .collect())
    }

    async fn current_load(&self, worker: &WorkerHost) -> Result<i64, RegistryError> {
        Ok(self.load_of(worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pick_worker_prefers_lowest_load_then_increments() {
        let store = InMemoryCoordinationStore::new();
        store.register_worker_if_absent(&WorkerHost::new("w1")).await.unwrap();
        store.register_worker_if_absent(&WorkerHost::new("w2")).await.unwrap();

        let picked = store.pick_worker(None).await.unwrap().unwrap();
        assert_eq!(picked, WorkerHost::new("w1"));
        assert_eq!(store.load_of(&WorkerHost::new("w1")), 1);
    }

    #[tokio::test]
    async fn pick_worker_respects_max_load() {
        let store = InMemoryCoordinationStore::new();
        let w1 = WorkerHost::new("w1");
        store.register_worker_if_absent(&w1).await.unwrap();
        store.pick_worker(None).await.unwrap();
        store.pick_worker(None).await.unwrap();

        assert_eq!(store.load_of(&w1), 2);
        assert_eq!(store.pick_worker(Some(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_worker_if_absent_does_not_reset_existing_score() {
        let store = InMemoryCoordinationStore::new();
        let w1 = WorkerHost::new("w1");
        store.register_worker_if_absent(&w1).await.unwrap();
        store.pick_worker(None).await.unwrap();
        assert_eq!(store.load_of(&w1), 1);

        store.register_worker_if_absent(&w1).await.unwrap();
        assert_eq!(store.load_of(&w1), 1);
    }

    #[tokio::test]
    async fn take_routing_is_idempotent() {
        let store = InMemoryCoordinationStore::new();
        let sid = SessionId::generate();
        store
            .record_session(
                sid,
                &WorkerHost::new("w1"),
                SessionDetail {
                    browser_guid: "guid".into(),
                    port: 1234,
                },
                100,
            )
            .await
            .unwrap();

        assert_eq!(store.take_routing(sid).await.unwrap(), Some(WorkerHost::new("w1")));
        assert_eq!(store.take_routing(sid).await.unwrap(), None);
    }
}
