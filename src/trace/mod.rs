//! Audit traces: the full record of one request's journey through
//! scanning, routing, and provider dispatch.
//!
//! A trace is created at request entry, mutated only by the dispatcher
//! during that request's lifetime, and sealed once a terminal status is
//! set. One persisted record per trace is what downstream usage and cost
//! tooling consumes.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::routing::{FirewallStatus, RoutingDecision};

pub use store::TraceStore;

// ── Trace model ──────────────────────────────────────────────────

/// Lifecycle status of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl TraceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceStatus::InProgress => "in_progress",
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
            TraceStatus::Blocked => "blocked",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "completed" => TraceStatus::Completed,
            "failed" => TraceStatus::Failed,
            "blocked" => TraceStatus::Blocked,
            _ => TraceStatus::InProgress,
        }
    }

    /// Terminal statuses seal the trace.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TraceStatus::InProgress)
    }
}

/// Audit flags that must never silently vanish from the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFlag {
    /// PII was detected but no local provider could take the request, so
    /// it went external anyway.
    FlaggedWithoutLocalFallback,
    /// The router chose LOCAL but no local provider served this lane
    /// (configuration drift); the dispatch degraded to external candidates.
    FallbackFromLocal,
    /// The caller cancelled the dispatch mid-flight.
    Cancelled,
}

/// Outcome of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    TransientFailure,
    FatalFailure,
}

/// One entry in the ordered attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub provider: String,
    /// 1-based attempt number within this provider's retry budget.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Short failure detail, empty on success.
    #[serde(default)]
    pub detail: String,
}

/// The full audit record of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    pub firewall_status: FirewallStatus,
    pub routing_decision: Option<RoutingDecision>,
    pub provider_used: Option<String>,
    pub model_used: Option<String>,
    pub flags: Vec<TraceFlag>,
    pub attempts: Vec<AttemptRecord>,
    /// Terminal error message, when the dispatch did not complete.
    pub error: Option<String>,
}

impl Trace {
    fn new(trace_id: String) -> Self {
        Self {
            trace_id,
            started_at: Utc::now(),
            ended_at: None,
            status: TraceStatus::InProgress,
            firewall_status: FirewallStatus::Clean,
            routing_decision: None,
            provider_used: None,
            model_used: None,
            flags: Vec::new(),
            attempts: Vec::new(),
            error: None,
        }
    }

    pub fn record_attempt(
        &mut self,
        provider: &str,
        attempt: u32,
        outcome: AttemptOutcome,
        detail: impl Into<String>,
    ) {
        self.attempts.push(AttemptRecord {
            provider: provider.to_string(),
            attempt,
            outcome,
            detail: detail.into(),
        });
    }

    pub fn flag(&mut self, flag: TraceFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }
}

// ── Recorder ─────────────────────────────────────────────────────

/// Process-wide sequence so ids allocated in the same millisecond still
/// sort by creation order and never collide.
static TRACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Issues correlation identifiers and persists sealed traces.
pub struct TraceRecorder {
    store: Option<TraceStore>,
}

impl TraceRecorder {
    /// Recorder without persistence (embedding, tests).
    pub fn new() -> Self {
        Self { store: None }
    }

    /// Recorder backed by the SQLite audit store.
    pub fn with_store(store: TraceStore) -> Self {
        Self { store: Some(store) }
    }

    /// Open a trace. The identifier is unique across the process lifetime
    /// and sortable by creation order.
    pub fn begin(&self) -> Trace {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let seq = TRACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let trace_id = format!("{millis:013}-{seq:08}-{}", &suffix[..8]);
        Trace::new(trace_id)
    }

    /// Seal and persist a trace. Persistence failures are logged, never
    /// propagated: a broken audit disk must not fail the request itself.
    pub fn end(&self, trace: &mut Trace) {
        trace.ended_at = Some(Utc::now());
        if !trace.status.is_terminal() {
            trace.status = TraceStatus::Failed;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.insert(trace) {
                tracing::error!(trace_id = %trace.trace_id, "failed to persist trace: {e}");
            }
        }
        tracing::debug!(
            trace_id = %trace.trace_id,
            status = trace.status.as_str(),
            attempts = trace.attempts.len(),
            "trace sealed"
        );
    }

    /// Fetch a persisted trace by id.
    pub fn get(&self, trace_id: &str) -> Option<Trace> {
        self.store.as_ref()?.get(trace_id).ok().flatten()
    }

    /// Most recent persisted traces, newest first.
    pub fn recent(&self, limit: u32) -> Vec<Trace> {
        self.store
            .as_ref()
            .map(|s| s.recent(limit).unwrap_or_default())
            .unwrap_or_default()
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn begin_sets_in_progress_with_empty_log() {
        let recorder = TraceRecorder::new();
        let trace = recorder.begin();
        assert_eq!(trace.status, TraceStatus::InProgress);
        assert!(trace.attempts.is_empty());
        assert!(trace.flags.is_empty());
        assert!(trace.ended_at.is_none());
    }

    #[test]
    fn trace_ids_are_unique_and_sortable() {
        let recorder = TraceRecorder::new();
        let ids: Vec<String> = (0..500).map(|_| recorder.begin().trace_id).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids, "ids must sort by creation order");
    }

    #[test]
    fn concurrent_begin_never_collides() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    let recorder = TraceRecorder::new();
                    (0..200)
                        .map(|_| recorder.begin().trace_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn end_seals_open_traces_as_failed() {
        let recorder = TraceRecorder::new();
        let mut trace = recorder.begin();
        recorder.end(&mut trace);
        assert_eq!(trace.status, TraceStatus::Failed);
        assert!(trace.ended_at.is_some());
    }

    #[test]
    fn flags_are_deduplicated() {
        let recorder = TraceRecorder::new();
        let mut trace = recorder.begin();
        trace.flag(TraceFlag::FallbackFromLocal);
        trace.flag(TraceFlag::FallbackFromLocal);
        assert_eq!(trace.flags.len(), 1);
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            TraceStatus::InProgress,
            TraceStatus::Completed,
            TraceStatus::Failed,
            TraceStatus::Blocked,
        ] {
            assert_eq!(TraceStatus::from_str_lossy(status.as_str()), status);
        }
    }
}
