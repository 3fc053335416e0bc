//! Redis-backed `CoordinationStore`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::config::coordination_keys as keys;
use crate::ids::{SessionId, WorkerHost};

use super::{CoordinationStore, RegistryError, SessionDetail};

/// The one place a Lua script is warranted (spec.md §9): a naive
/// read-then-write "pick lowest, then increment" is not atomic under
/// contention, so the pick and the increment happen in a single round trip.
const PICK_WORKER_SCRIPT: &str = r#"
local max = tonumber(ARGV[1])
local c = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if not c[1] then return nil end
local w, load = c[1], tonumber(c[2])
if max and load >= max then return nil end
redis.call('ZINCRBY', KEYS[1], 1, w)
return w
"#;

#[derive(Clone)]
pub struct RedisCoordinationStore {
    conn: ConnectionManager,
}

impl RedisCoordinationStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(redis_url).map_err(|e| RegistryError::Store(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn store_err(e: redis::RedisError) -> RegistryError {
    RegistryError::Store(e.to_string())
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn pick_worker(&self, max_load: Option<i64>) -> Result<Option<WorkerHost>, RegistryError> {
        let mut conn = self.conn.clone();
        let max_arg = max_load.map_or_else(String::new, |m| m.to_string());
        let result: Option<String> = Script::new(PICK_WORKER_SCRIPT)
            .key(keys::WORKERS_LOAD)
            .arg(max_arg)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(result.map(WorkerHost::new))
    }

    async fn decrement_worker_load(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: f64 = conn
            .zincr(keys::WORKERS_LOAD, worker.as_str(), -1)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn register_worker_if_absent(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(keys::WORKERS_LOAD)
            .arg("NX")
            .arg(0)
            .arg(worker.as_str())
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn deregister_worker(&self, worker: &WorkerHost) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zrem(keys::WORKERS_LOAD, worker.as_str())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn record_session(
        &self,
        session_id: SessionId,
        worker: &WorkerHost,
        detail: SessionDetail,
        now_epoch: i64,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let sid = session_id.to_string();
        let detail_key = keys::session_detail_key(&sid);
        let _: () = redis::pipe()
            .atomic()
            .hset(keys::SESSION_MAP, &sid, worker.as_str())
            .ignore()
            .hset(&detail_key, "browserId", &detail.browser_guid)
            .ignore()
            .hset(&detail_key, "port", detail.port)
            .ignore()
            .zadd(keys::SESSION_LAST_ACTIVE, &sid, now_epoch)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn get_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError> {
        let mut conn = self.conn.clone();
        let host: Option<String> = conn
            .hget(keys::SESSION_MAP, session_id.to_string())
            .await
            .map_err(store_err)?;
        Ok(host.map(WorkerHost::new))
    }

    async fn get_detail(&self, session_id: SessionId) -> Result<Option<SessionDetail>, RegistryError> {
        let mut conn = self.conn.clone();
        let key = keys::session_detail_key(&session_id.to_string());
        let browser_guid: Option<String> = conn.hget(&key, "browserId").await.map_err(store_err)?;
        let port: Option<u16> = conn.hget(&key, "port").await.map_err(store_err)?;
        Ok(match (browser_guid, port) {
            (Some(browser_guid), Some(port)) => Some(SessionDetail { browser_guid, port }),
            _ => None,
        })
    }

    async fn touch_activity(&self, session_id: SessionId, now_epoch: i64) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(keys::SESSION_LAST_ACTIVE, session_id.to_string(), now_epoch)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn take_routing(&self, session_id: SessionId) -> Result<Option<WorkerHost>, RegistryError> {
        // HGET + HDEL is not a single atomic op, but a lost race here only
        // risks a double-close attempt, which the close protocol already
        // tolerates (it is idempotent). A Lua script would close the
        // residual race entirely; left as a follow-up if contention proves
        // costly in practice.
        let mut conn = self.conn.clone();
        let sid = session_id.to_string();
        let host: Option<String> = conn.hget(keys::SESSION_MAP, &sid).await.map_err(store_err)?;
        if host.is_some() {
            let _: i64 = conn.hdel(keys::SESSION_MAP, &sid).await.map_err(store_err)?;
        }
        Ok(host.map(WorkerHost::new))
    }

    async fn clear_volatile_entries(&self, session_id: SessionId) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let sid = session_id.to_string();
        let detail_key = keys::session_detail_key(&sid);
        let _: () = redis::pipe()
            .atomic()
            .del(&detail_key)
            .ignore()
            .zrem(keys::SESSION_LAST_ACTIVE, &sid)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn idle_session_ids(&self, idle_cutoff_epoch: i64) -> Result<Vec<SessionId>, RegistryError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(keys::SESSION_LAST_ACTIVE, "-inf", idle_cutoff_epoch)
            .await
            .map_err(store_err)?;
        Ok(ids.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    async fn current_load(&self, worker: &WorkerHost) -> Result<i64, RegistryError> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn
            .zscore(keys::WORKERS_LOAD, worker.as_str())
            .await
            .map_err(store_err)?;
        Ok(score.map_or(0, |s| s as i64))
    }
}
