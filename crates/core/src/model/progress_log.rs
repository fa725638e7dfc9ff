use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{SessionLogId, SummaryLogId};

/// Progress at or above this value counts as complete.
pub const COMPLETE_PROGRESS: f64 = 1.0;

/// Clamp a progress value into `[0, 1]`.
#[must_use]
pub fn clamp_progress(value: f64) -> f64 {
    value.clamp(0.0, COMPLETE_PROGRESS)
}

fn empty_extra_fields() -> Value {
    Value::Object(serde_json::Map::new())
}

//
// ─── SUMMARY LOG ──────────────────────────────────────────────────────────────
//

/// Cross-session cumulative record for one (user, content) pair.
///
/// The `*_before_current_session` fields are snapshots taken when the
/// viewing session starts; session-level counters are added on top of them.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLog {
    pub id: Option<SummaryLogId>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub progress: f64,
    pub time_spent: f64,
    pub extra_fields: Value,
    pub time_spent_before_current_session: f64,
    pub progress_before_current_session: f64,
}

impl SummaryLog {
    /// Defaults for a summary that does not exist on the server yet.
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            start_timestamp: now,
            end_timestamp: now,
            completion_timestamp: None,
            progress: 0.0,
            time_spent: 0.0,
            extra_fields: empty_extra_fields(),
            time_spent_before_current_session: 0.0,
            progress_before_current_session: 0.0,
        }
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_PROGRESS
    }
}

//
// ─── SESSION LOG ──────────────────────────────────────────────────────────────
//

/// Per-viewing-session record. Never reused across sessions.
///
/// `total_time_at_last_save` and `progress_at_last_save` are watermarks the
/// threshold checks measure against.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLog {
    pub id: Option<SessionLogId>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub time_spent: f64,
    pub progress: f64,
    pub extra_fields: Value,
    pub total_time_at_last_save: f64,
    pub progress_at_last_save: f64,
}

impl SessionLog {
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            start_timestamp: now,
            end_timestamp: now,
            time_spent: 0.0,
            progress: 0.0,
            extra_fields: empty_extra_fields(),
            total_time_at_last_save: 0.0,
            progress_at_last_save: 0.0,
        }
    }

    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Move both watermarks up to the current counters.
    pub fn mark_saved(&mut self) {
        self.progress_at_last_save = self.progress;
        self.total_time_at_last_save = self.time_spent;
    }
}
