//! SQLite persistence for sealed traces.
//!
//! One row per trace, keyed by trace id. Attempt logs and flags are stored
//! as JSON columns; everything else is flat so the usage/cost tooling can
//! query it directly.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::{Trace, TraceStatus};
use crate::routing::{FirewallStatus, RoutingDecision};

pub struct TraceStore {
    conn: Mutex<Connection>,
}

impl TraceStore {
    /// Open (or create) the store at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create trace dir: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open trace DB: {}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral embedding.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS traces (
                trace_id         TEXT PRIMARY KEY,
                started_at       TEXT NOT NULL,
                ended_at         TEXT,
                status           TEXT NOT NULL,
                firewall_status  TEXT NOT NULL,
                routing_decision TEXT,
                provider_used    TEXT,
                model_used       TEXT,
                flags            TEXT NOT NULL DEFAULT '[]',
                attempts         TEXT NOT NULL DEFAULT '[]',
                error            TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_traces_started_at ON traces (started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_traces_status     ON traces (status);",
        )?;
        Ok(())
    }

    /// Insert (or replace) one sealed trace.
    pub fn insert(&self, trace: &Trace) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO traces
                (trace_id, started_at, ended_at, status, firewall_status,
                 routing_decision, provider_used, model_used, flags, attempts, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                trace.trace_id,
                trace.started_at.to_rfc3339(),
                trace.ended_at.map(|t| t.to_rfc3339()),
                trace.status.as_str(),
                trace.firewall_status.as_str(),
                trace.routing_decision.map(|d| d.as_str()),
                trace.provider_used,
                trace.model_used,
                serde_json::to_string(&trace.flags)?,
                serde_json::to_string(&trace.attempts)?,
                trace.error,
            ],
        )?;
        Ok(())
    }

    /// Fetch one trace by id.
    pub fn get(&self, trace_id: &str) -> Result<Option<Trace>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT trace_id, started_at, ended_at, status, firewall_status,
                    routing_decision, provider_used, model_used, flags, attempts, error
             FROM traces WHERE trace_id = ?1",
            params![trace_id],
            Self::row_to_trace,
        )
        .optional()
        .context("trace query failed")
    }

    /// Most recent traces, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<Trace>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT trace_id, started_at, ended_at, status, firewall_status,
                    routing_decision, provider_used, model_used, flags, attempts, error
             FROM traces ORDER BY trace_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::row_to_trace)?;
        let mut traces = Vec::new();
        for row in rows {
            traces.push(row?);
        }
        Ok(traces)
    }

    /// Count of persisted traces.
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM traces", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_trace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trace> {
        let started_at: String = row.get(1)?;
        let ended_at: Option<String> = row.get(2)?;
        let status: String = row.get(3)?;
        let firewall_status: String = row.get(4)?;
        let routing_decision: Option<String> = row.get(5)?;
        let flags: String = row.get(8)?;
        let attempts: String = row.get(9)?;

        Ok(Trace {
            trace_id: row.get(0)?,
            started_at: parse_ts(&started_at),
            ended_at: ended_at.as_deref().map(parse_ts),
            status: TraceStatus::from_str_lossy(&status),
            firewall_status: FirewallStatus::from_str_lossy(&firewall_status),
            routing_decision: routing_decision
                .as_deref()
                .map(RoutingDecision::from_str_lossy),
            provider_used: row.get(6)?,
            model_used: row.get(7)?,
            flags: serde_json::from_str(&flags).unwrap_or_default(),
            attempts: serde_json::from_str(&attempts).unwrap_or_default(),
            error: row.get(10)?,
        })
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{AttemptOutcome, TraceFlag, TraceRecorder};

    fn sealed_trace(recorder: &TraceRecorder) -> Trace {
        let mut trace = recorder.begin();
        trace.firewall_status = FirewallStatus::Flagged;
        trace.routing_decision = Some(RoutingDecision::External);
        trace.flag(TraceFlag::FlaggedWithoutLocalFallback);
        trace.record_attempt("openrouter", 1, AttemptOutcome::TransientFailure, "status 503");
        trace.record_attempt("openrouter", 2, AttemptOutcome::Succeeded, "");
        trace.provider_used = Some("openrouter".into());
        trace.model_used = Some("anthropic/claude-sonnet".into());
        trace.status = TraceStatus::Completed;
        trace.ended_at = Some(Utc::now());
        trace
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let store = TraceStore::in_memory().unwrap();
        let recorder = TraceRecorder::new();
        let trace = sealed_trace(&recorder);
        store.insert(&trace).unwrap();

        let fetched = store.get(&trace.trace_id).unwrap().unwrap();
        assert_eq!(fetched.trace_id, trace.trace_id);
        assert_eq!(fetched.status, TraceStatus::Completed);
        assert_eq!(fetched.firewall_status, FirewallStatus::Flagged);
        assert_eq!(fetched.routing_decision, Some(RoutingDecision::External));
        assert_eq!(fetched.provider_used.as_deref(), Some("openrouter"));
        assert_eq!(fetched.flags, vec![TraceFlag::FlaggedWithoutLocalFallback]);
        assert_eq!(fetched.attempts.len(), 2);
        assert_eq!(fetched.attempts[0].outcome, AttemptOutcome::TransientFailure);
        assert_eq!(fetched.attempts[1].outcome, AttemptOutcome::Succeeded);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = TraceStore::in_memory().unwrap();
        assert!(store.get("no-such-trace").unwrap().is_none());
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = TraceStore::in_memory().unwrap();
        let recorder = TraceRecorder::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let trace = sealed_trace(&recorder);
            ids.push(trace.trace_id.clone());
            store.insert(&trace).unwrap();
        }
        let recent = store.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].trace_id, ids[4]);
        assert_eq!(recent[1].trace_id, ids[3]);
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("audit").join("traces.db");
        let recorder = TraceRecorder::new();
        let trace = sealed_trace(&recorder);
        {
            let store = TraceStore::new(&db_path).unwrap();
            store.insert(&trace).unwrap();
        }
        let store = TraceStore::new(&db_path).unwrap();
        assert!(store.get(&trace.trace_id).unwrap().is_some());
    }
}
