//! The fast in-memory coordination store: worker load, session routing,
//! session detail, and session activity (spec.md §3, §6).
//!
//! `CoordinationStore` is a trait so the scheduler, orchestrator, relay and
//! reaper can be exercised in tests against an in-process fake without a
//! live Redis, mirroring the teacher's `ConversationStorage`/`DatabaseStorage`
//! split in `runtime/traits.rs` and `runtime/testing.rs`.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{SessionId, WorkerHost};

pub use memory_store::InMemoryCoordinationStore;
pub use redis_store::RedisCoordinationStore;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("coordination store error: {0}")]
    Store(String),
}

/// The detail entry populated by the worker-side RPC response (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetail {
    pub browser_guid: String,
    pub port: u16,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically select the lowest-scored worker and increment its score by
    /// one (spec.md §4.1). Returns `None` without mutating if the set is
    /// empty or the minimum score is already at `max_load`.
    async fn pick_worker(&self, max_load: Option<i64>) -> Result<Option<WorkerHost>, RegistryError>;

    /// Decrement a worker's load score by one. Must only be called on paths
    /// that previously incremented it (spec.md §4.1).
    async fn decrement_worker_load(&self, worker: &WorkerHost) -> Result<(), RegistryError>;

    /// Add `(worker, 0)` to the load set only if the member is absent; never
    /// resets an existing score (spec.md §4.6 "Self-registration").
    async fn register_worker_if_absent(&self, worker: &WorkerHost) -> Result<(), RegistryError>;

    /// Remove a worker from the load set entirely (called on clean shutdown).
    async fn deregister_worker(&self, worker: &WorkerHost) -> Result<(), RegistryError>;

    /// Write the routing entry, detail entry, and activity entry for a newly
    /// created session in a single pipelined write (spec.md §4.2 step 5).
    async fn record_session(
        &self,
        session_id: SessionId,
        worker: &WorkerHost,
        detail: SessionDetail,
        now_epoch: i64,
    ) -> Result<(), RegistryError>;

    /// Look up the routing entry without deleting it (used by the relay to
    /// resolve a worker host, spec.md §4.4 "Resolution").
    async fn get_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError>;

    /// Look up the detail entry (spec.md §4.4 "Resolution").
    async fn get_detail(&self, session_id: SessionId) -> Result<Option<SessionDetail>, RegistryError>;

    /// Update the activity entry to `now` (spec.md §4.4 "Pumps").
    async fn touch_activity(&self, session_id: SessionId, now_epoch: i64) -> Result<(), RegistryError>;

    /// Atomically read-and-delete the routing entry. `None` signals the
    /// close protocol's idempotent no-op case (spec.md §4.3 step 1).
    async fn take_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError>;

    /// Delete the detail and activity entries in one pipelined write
    /// (spec.md §4.3 step 4).
    async fn clear_volatile_entries(&self, session_id: SessionId) -> Result<(), RegistryError>;

    /// Session ids whose activity score is at or below `idle_cutoff_epoch`
    /// (spec.md §4.5 step 2).
    async fn idle_session_ids(&self, idle_cutoff_epoch: i64) -> Result<Vec<SessionId>, RegistryError>;

    /// Current load score for a worker, 0 if it has none recorded. Used by
    /// tests to check load-score conservation (spec.md §8 invariant 4); not
    /// on the orchestrator's own hot path.
    async fn current_load(&self, worker: &WorkerHost) -> Result<i64, RegistryError>;
}
