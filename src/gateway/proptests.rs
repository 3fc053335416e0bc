//! Property-based tests for the universal invariants spec.md §8 calls out
//! explicitly as "(property-based)": idempotent close, load-score
//! conservation, and monotonic activity. Exercises the orchestrator and
//! coordination store directly against arbitrary operation sequences rather
//! than the handful of fixed scenarios in `orchestrator.rs`'s own test
//! module, mirroring the teacher's `state_machine/proptests.rs`.

use std::sync::Arc;

use proptest::prelude::*;

use crate::coordination::{CoordinationStore, InMemoryCoordinationStore, SessionDetail};
use crate::db::Database;
use crate::ids::{SessionId, TenantId, WorkerHost};

use super::orchestrator::Orchestrator;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

/// Simulates the effect of a successful `createSession` (spec.md §4.2 steps
/// 3-5) without a live worker RPC: the orchestrator's own `create_session`
/// can't be property-tested end-to-end without a real worker process behind
/// it, so these tests drive the store/db writes the same way the
/// orchestrator does, then exercise the orchestrator's real `close_session`
/// against the result.
async fn simulate_create(
    db: &Database,
    store: &Arc<dyn CoordinationStore>,
    worker: &WorkerHost,
    now_epoch: i64,
) -> SessionId {
    let session_id = SessionId::generate();
    db.insert_session(session_id, TenantId::NIL, worker, None).unwrap();
    store
        .record_session(
            session_id,
            worker,
            SessionDetail {
                browser_guid: "guid".into(),
                port: 41123,
            },
            now_epoch,
        )
        .await
        .unwrap();
    session_id
}

fn harness() -> (Database, Arc<dyn CoordinationStore>, Orchestrator, WorkerHost) {
    let db = Database::open_in_memory().unwrap();
    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let orch = Orchestrator::new(db.clone(), store.clone(), "localhost:8000".into(), 5000);
    (db, store, orch, WorkerHost::new("w1"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Invariant 1 + 2 (spec.md §8): after close, no routing/detail/activity
    /// entries remain; while active, the routing entry's worker matches the
    /// relational row's `worker_id` under `status=active`.
    #[test]
    fn prop_close_clears_volatile_entries_and_routing_matches_relational_row(
        close_count in 1usize..4,
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (db, store, orch, worker) = harness();
            store.register_worker_if_absent(&worker).await.unwrap();
            let session_id = simulate_create(&db, &store, &worker, 1_000).await;

            // Invariant 2: while active, routing matches the relational row.
            let routed = store.get_routing(session_id).await.unwrap().unwrap();
            let row = db.get_session(session_id).unwrap().unwrap();
            prop_assert_eq!(&routed, &row.worker_id);
            prop_assert_eq!(row.status, crate::db::SessionStatus::Active);

            for _ in 0..close_count {
                orch.close_session(session_id).await.unwrap();
            }

            // Invariant 1: no volatile entries survive close, regardless of
            // how many times close was invoked.
            prop_assert_eq!(store.get_routing(session_id).await.unwrap(), None);
            prop_assert_eq!(store.get_detail(session_id).await.unwrap(), None);
            prop_assert!(store.idle_session_ids(i64::MAX).await.unwrap().is_empty());

            let row = db.get_session(session_id).unwrap().unwrap();
            prop_assert_eq!(row.status, crate::db::SessionStatus::Closed);
            prop_assert!(row.ended_at.is_some());
        });
    }

    /// Invariant 4 (spec.md §8): create-then-immediately-close leaves the
    /// worker's load score unchanged from its pre-create value, no matter
    /// how many sessions were interleaved.
    #[test]
    fn prop_create_then_close_restores_load_score(session_count in 1usize..6) {
        let rt = runtime();
        rt.block_on(async {
            let (db, store, orch, worker) = harness();
            store.register_worker_if_absent(&worker).await.unwrap();

            let baseline = store.pick_worker(None).await.unwrap().unwrap();
            store.decrement_worker_load(&baseline).await.unwrap();
            let pre_create_score = store.current_load(&worker).await.unwrap();

            let mut ids = Vec::new();
            for i in 0..session_count {
                ids.push(simulate_create(&db, &store, &worker, 1_000 + i as i64).await);
            }
            for id in &ids {
                orch.close_session(*id).await.unwrap();
            }

            prop_assert_eq!(store.current_load(&worker).await.unwrap(), pre_create_score);
        });
    }

    /// Invariant 5 (spec.md §8): `closeSession(s)` called N times has the
    /// same observable effect as calling it once.
    #[test]
    fn prop_close_session_is_idempotent(n in 1usize..8) {
        let rt = runtime();
        rt.block_on(async {
            let (db, store, orch, worker) = harness();
            store.register_worker_if_absent(&worker).await.unwrap();
            let session_id = simulate_create(&db, &store, &worker, 500).await;

            orch.close_session(session_id).await.unwrap();
            let after_first = db.get_session(session_id).unwrap().unwrap();

            for _ in 0..n {
                orch.close_session(session_id).await.unwrap();
            }
            let after_n = db.get_session(session_id).unwrap().unwrap();

            prop_assert_eq!(after_first.status, after_n.status);
            prop_assert_eq!(after_first.ended_at, after_n.ended_at);
            prop_assert_eq!(store.get_routing(session_id).await.unwrap(), None);
        });
    }

    /// Invariant 6 (spec.md §8): a touch at time `t` leaves the activity
    /// score `>= t`, for any sequence of (possibly unordered) touch calls.
    #[test]
    fn prop_activity_touch_never_regresses_below_its_own_timestamp(
        touches in proptest::collection::vec(0i64..1_000_000, 1..10),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
            let session_id = SessionId::generate();

            for t in touches {
                store.touch_activity(session_id, t).await.unwrap();
                // idle_session_ids(t - 1) must NOT contain this session: its
                // score is exactly `t`, which is > `t - 1`.
                let still_idle_at = store.idle_session_ids(t - 1).await.unwrap();
                prop_assert!(!still_idle_at.contains(&session_id));
                // idle_session_ids(t) must contain it: score <= t holds with
                // equality.
                let idle_at = store.idle_session_ids(t).await.unwrap();
                prop_assert!(idle_at.contains(&session_id));
            }
        });
    }
}
