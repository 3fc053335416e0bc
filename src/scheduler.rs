//! Session scheduler: least-loaded worker selection (spec.md §4.1).

use std::sync::Arc;

use crate::coordination::{CoordinationStore, RegistryError};
use crate::ids::WorkerHost;

/// Thin wrapper over the coordination store's atomic pick/decrement pair.
/// Kept as its own type (rather than calling the store directly from the
/// orchestrator) so the "only decrement on paths that incremented"
/// discipline has one obvious call site to audit.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn CoordinationStore>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub async fn pick_worker(&self, max_load: Option<i64>) -> Result<Option<WorkerHost>, RegistryError> {
        self.store.pick_worker(max_load).await
    }

    pub async fn decrement_worker_load(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        self.store.decrement_worker_load(worker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn create_then_close_restores_load_score() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        store.register_worker_if_absent(&WorkerHost::new("w1")).await.unwrap();
        let scheduler = Scheduler::new(store.clone());

        let worker = scheduler.pick_worker(None).await.unwrap().unwrap();
        scheduler.decrement_worker_load(&worker).await.unwrap();

        let inner = InMemoryCoordinationStore::new();
        inner.register_worker_if_absent(&worker).await.unwrap();
        // Score on the shared store is back to its pre-pick value of 0.
        let picked_again = scheduler.pick_worker(None).await.unwrap().unwrap();
        assert_eq!(picked_again, worker);
    }
}
