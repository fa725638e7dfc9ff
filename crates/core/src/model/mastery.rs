use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{MasteryLogId, SummaryLogId};

//
// ─── MASTERY CRITERION ────────────────────────────────────────────────────────
//

/// Policy deciding when a run of responses counts as mastery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MasteryCriterion {
    /// At least `m` correct among the last `n` responses.
    #[serde(rename = "m_of_n")]
    MOfN { m: u32, n: u32 },
    /// The last `n` responses are all correct.
    NumCorrectInARow { n: u32 },
    /// Every item in the exercise answered correctly.
    DoAll,
}

impl MasteryCriterion {
    /// Whether `history` (oldest first) satisfies the criterion.
    ///
    /// `item_count` is only consulted by `DoAll`.
    #[must_use]
    pub fn is_met(&self, history: &[bool], item_count: usize) -> bool {
        match *self {
            MasteryCriterion::MOfN { m, n } => {
                let window = tail(history, n as usize);
                window.len() >= n as usize
                    && window.iter().filter(|c| **c).count() >= m as usize
            }
            MasteryCriterion::NumCorrectInARow { n } => {
                let window = tail(history, n as usize);
                n > 0 && window.len() >= n as usize && window.iter().all(|c| *c)
            }
            MasteryCriterion::DoAll => {
                let window = tail(history, item_count);
                item_count > 0 && window.len() >= item_count && window.iter().all(|c| *c)
            }
        }
    }
}

fn tail(history: &[bool], len: usize) -> &[bool] {
    &history[history.len().saturating_sub(len)..]
}

//
// ─── MASTERY LOG ──────────────────────────────────────────────────────────────
//

/// Whether a mastery log is mirrored on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Remote,
    /// Drives attempt tracking for anonymous viewers; never sent anywhere.
    LocalOnly,
}

/// Level and completion state of one run through an assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct MasteryLog {
    pub id: Option<MasteryLogId>,
    pub summary_log: Option<SummaryLogId>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub mastery_level: u32,
    pub complete: bool,
    pub response_history: Vec<bool>,
    pub total_attempts: u32,
    pub mastery_criterion: Option<MasteryCriterion>,
    pub persistence: Persistence,
}

impl MasteryLog {
    /// First mastery level for a learner on a given assessment.
    pub const INITIAL_LEVEL: u32 = 1;

    #[must_use]
    pub fn new(
        summary_log: SummaryLogId,
        mastery_level: u32,
        mastery_criterion: MasteryCriterion,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            summary_log: Some(summary_log),
            start_timestamp: now,
            end_timestamp: None,
            completion_timestamp: None,
            mastery_level,
            complete: false,
            response_history: Vec::new(),
            total_attempts: 0,
            mastery_criterion: Some(mastery_criterion),
            persistence: Persistence::Remote,
        }
    }

    /// Local-only log for viewers without a summary log.
    #[must_use]
    pub fn dummy(now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            summary_log: None,
            start_timestamp: now,
            end_timestamp: None,
            completion_timestamp: None,
            mastery_level: Self::INITIAL_LEVEL,
            complete: false,
            response_history: Vec::new(),
            total_attempts: 0,
            mastery_criterion: None,
            persistence: Persistence::LocalOnly,
        }
    }

    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.persistence == Persistence::LocalOnly
    }

    /// Complete and finished longer ago than `spacing`.
    ///
    /// A complete log without a completion timestamp counts as elapsed.
    #[must_use]
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, spacing: Duration) -> bool {
        if !self.complete {
            return false;
        }
        match self.completion_timestamp {
            Some(done) => now.signed_duration_since(done) > spacing,
            None => true,
        }
    }

    /// Record the outcome of a learner's first try at an item.
    pub fn record_first_attempt(&mut self, correct: bool, at: DateTime<Utc>) {
        self.response_history.push(correct);
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.end_timestamp = Some(at);
    }

    pub fn mark_complete(&mut self, at: DateTime<Utc>) {
        self.complete = true;
        self.completion_timestamp = Some(at);
        self.end_timestamp = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn m_of_n_counts_recent_window() {
        let c = MasteryCriterion::MOfN { m: 3, n: 4 };
        assert!(c.is_met(&[false, true, true, false, true], 0));
        assert!(!c.is_met(&[true, true, false, false], 0));
        assert!(!c.is_met(&[true, true], 0));
    }

    #[test]
    fn correct_in_a_row_requires_streak() {
        let c = MasteryCriterion::NumCorrectInARow { n: 2 };
        assert!(c.is_met(&[false, true, true], 0));
        assert!(!c.is_met(&[true, false], 0));
    }

    #[test]
    fn do_all_uses_item_count() {
        let c = MasteryCriterion::DoAll;
        assert!(c.is_met(&[false, true, true, true], 3));
        assert!(!c.is_met(&[true, true], 3));
        assert!(!c.is_met(&[], 0));
    }

    #[test]
    fn criterion_serializes_with_type_tag() {
        let value = serde_json::to_value(MasteryCriterion::MOfN { m: 5, n: 5 }).unwrap();
        assert_eq!(value, serde_json::json!({"type": "m_of_n", "m": 5, "n": 5}));
        let parsed: MasteryCriterion =
            serde_json::from_value(serde_json::json!({"type": "do_all"})).unwrap();
        assert_eq!(parsed, MasteryCriterion::DoAll);
    }

    #[test]
    fn cooldown_only_applies_to_complete_logs() {
        let now = fixed_now();
        let mut log = MasteryLog::new(
            SummaryLogId::new("s1"),
            2,
            MasteryCriterion::DoAll,
            now - Duration::minutes(20),
        );
        assert!(!log.cooldown_elapsed(now, Duration::minutes(5)));

        log.mark_complete(now - Duration::minutes(10));
        assert!(log.cooldown_elapsed(now, Duration::minutes(5)));
        assert!(!log.cooldown_elapsed(now, Duration::minutes(15)));
    }

    #[test]
    fn first_attempt_extends_history() {
        let mut log = MasteryLog::dummy(fixed_now());
        log.record_first_attempt(true, fixed_now());
        log.record_first_attempt(false, fixed_now());
        assert_eq!(log.response_history, vec![true, false]);
        assert_eq!(log.total_attempts, 2);
        assert!(log.is_local_only());
    }
}
