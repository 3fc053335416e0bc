//! Relational store: the authoritative `browser_sessions` table.
//!
//! A single `rusqlite::Connection` behind a mutex, matching the teacher's
//! `Database` handle. The spec's "bounded connection pool (5 base + 10
//! overflow)" language describes a networked RDBMS; for an embedded SQLite
//! file the single-connection-behind-a-mutex pattern is the faithful
//! equivalent (see DESIGN.md).

mod schema;

pub use schema::{Session, SessionStatus};
use schema::{parse_datetime, SCHEMA};

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::ids::{SessionId, TenantId, WorkerHost};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe handle to the relational store.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path, creating the table if
    /// missing. Migration mechanics beyond table-create-if-missing are out
    /// of scope (spec.md §1).
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.conn.lock().unwrap().execute_batch(SCHEMA)?;
        Ok(db)
    }

    /// Open an in-memory database, used by tests and the in-process
    /// coordination-store-free unit tests elsewhere in the crate.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.conn.lock().unwrap().execute_batch(SCHEMA)?;
        Ok(db)
    }

    /// Insert a new active session row.
    pub fn insert_session(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
        worker_id: &WorkerHost,
        client_id: Option<&str>,
    ) -> DbResult<Session> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO browser_sessions
                (session_id, tenant_id, worker_id, client_id, created_at, last_active_at, ended_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, NULL, 'active')",
            params![
                session_id.to_string(),
                tenant_id.to_string(),
                worker_id.as_str(),
                client_id,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Session {
            session_id,
            tenant_id,
            worker_id: worker_id.clone(),
            client_id: client_id.map(str::to_string),
            created_at: now,
            last_active_at: now,
            ended_at: None,
            status: SessionStatus::Active,
        })
    }

    /// Mark a session closed. Idempotent: closing an already-closed row is a
    /// harmless no-op update.
    pub fn close_session(&self, session_id: SessionId) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "UPDATE browser_sessions SET status = 'closed', ended_at = ?1
             WHERE session_id = ?2 AND status = 'active'",
            params![now.to_rfc3339(), session_id.to_string()],
        )?;
        Ok(())
    }

    /// List sessions for a tenant, newest first (spec.md §4.2 `listSessions`).
    pub fn list_sessions(&self, tenant_id: TenantId) -> DbResult<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, tenant_id, worker_id, client_id, created_at, last_active_at, ended_at, status
             FROM browser_sessions WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![tenant_id.to_string()], parse_session_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Fetch a single session by id, regardless of tenant (used by the
    /// reaper's absolute-timeout scan and internal lookups).
    pub fn get_session(&self, session_id: SessionId) -> DbResult<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, tenant_id, worker_id, client_id, created_at, last_active_at, ended_at, status
             FROM browser_sessions WHERE session_id = ?1",
        )?;
        stmt.query_row(params![session_id.to_string()], parse_session_row)
            .optional()
            .map_err(DbError::from)
    }

    /// Session ids whose `status='active'` and age exceeds `absolute_timeout`
    /// (spec.md §4.5 step 3).
    pub fn active_sessions_older_than(
        &self,
        absolute_timeout: chrono::Duration,
    ) -> DbResult<Vec<SessionId>> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - absolute_timeout).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT session_id FROM browser_sessions WHERE status = 'active' AND created_at < ?1",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            let s: String = row.get(0)?;
            Ok(s)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let s = row?;
            if let Ok(id) = s.parse::<SessionId>() {
                out.push(id);
            }
        }
        Ok(out)
    }
}

fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let session_id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let worker_id: String = row.get(2)?;
    let status: String = row.get(7)?;

    Ok(Session {
        session_id: session_id.parse().unwrap_or_else(|_| SessionId::generate()),
        tenant_id: tenant_id.parse().unwrap_or(TenantId::NIL),
        worker_id: WorkerHost::new(worker_id),
        client_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        last_active_at: parse_datetime(&row.get::<_, String>(5)?),
        ended_at: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_datetime(&s)),
        status: SessionStatus::from_str(&status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrips() {
        let db = Database::open_in_memory().unwrap();
        let sid = SessionId::generate();
        let tid = TenantId::NIL;
        let worker = WorkerHost::new("w1");

        let inserted = db.insert_session(sid, tid, &worker, Some("cli-1")).unwrap();
        assert_eq!(inserted.status, SessionStatus::Active);

        let fetched = db.get_session(sid).unwrap().unwrap();
        assert_eq!(fetched.worker_id, worker);
        assert_eq!(fetched.client_id.as_deref(), Some("cli-1"));
    }

    #[test]
    fn close_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let sid = SessionId::generate();
        db.insert_session(sid, TenantId::NIL, &WorkerHost::new("w1"), None)
            .unwrap();

        db.close_session(sid).unwrap();
        db.close_session(sid).unwrap();

        let row = db.get_session(sid).unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Closed);
        assert!(row.ended_at.is_some());
    }

    #[test]
    fn list_sessions_is_tenant_scoped_and_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let tenant_a = TenantId::from(uuid::Uuid::from_u128(1));
        let tenant_b = TenantId::from(uuid::Uuid::from_u128(2));

        let s1 = SessionId::generate();
        db.insert_session(s1, tenant_a, &WorkerHost::new("w1"), None)
            .unwrap();
        let s2 = SessionId::generate();
        db.insert_session(s2, tenant_b, &WorkerHost::new("w1"), None)
            .unwrap();

        let a_sessions = db.list_sessions(tenant_a).unwrap();
        assert_eq!(a_sessions.len(), 1);
        assert_eq!(a_sessions[0].session_id, s1);
    }

    #[test]
    fn active_sessions_older_than_filters_by_age() {
        let db = Database::open_in_memory().unwrap();
        let sid = SessionId::generate();
        db.insert_session(sid, TenantId::NIL, &WorkerHost::new("w1"), None)
            .unwrap();

        let none_yet = db.active_sessions_older_than(chrono::Duration::hours(1)).unwrap();
        assert!(none_yet.is_empty());

        let all = db.active_sessions_older_than(chrono::Duration::seconds(-1)).unwrap();
        assert_eq!(all, vec![sid]);
    }
}
