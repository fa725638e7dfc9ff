//! Translation between server log records and local log state.

mod records;
mod tables;

pub use records::{AttemptLogRecord, MasteryLogRecord, SessionLogRecord, SummaryLogRecord};
pub use tables::{ATTEMPT_LOG, FieldMap, MASTERY_LOG, SESSION_LOG, SUMMARY_LOG, decode_record};

use serde_json::Value;

use crate::model::{
    AttemptLog, ContentRef, MasteryLog, Persistence, SessionLog, SummaryLog, UserId,
    clamp_progress,
};

fn extra_fields_or_empty(value: &Value) -> Value {
    match value {
        Value::Null => Value::Object(serde_json::Map::new()),
        // Older servers store the blob as a JSON-encoded string.
        Value::String(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
        other => other.clone(),
    }
}

//
// ─── SUMMARY LOG ──────────────────────────────────────────────────────────────
//

/// Hydrate local summary state, snapshotting the persisted counters.
#[must_use]
pub fn summary_from_record(record: &SummaryLogRecord) -> SummaryLog {
    let progress = clamp_progress(record.progress);
    SummaryLog {
        id: record.id.clone(),
        start_timestamp: record.start_timestamp,
        end_timestamp: record.end_timestamp.unwrap_or(record.start_timestamp),
        completion_timestamp: record.completion_timestamp,
        progress,
        time_spent: record.time_spent,
        extra_fields: extra_fields_or_empty(&record.extra_fields),
        time_spent_before_current_session: record.time_spent,
        progress_before_current_session: progress,
    }
}

#[must_use]
pub fn summary_to_record(
    summary: &SummaryLog,
    content: &ContentRef,
    user: Option<&UserId>,
) -> SummaryLogRecord {
    SummaryLogRecord {
        id: summary.id.clone(),
        user: user.cloned(),
        channel_id: Some(content.channel_id.clone()),
        content_id: Some(content.content_id.clone()),
        kind: Some(content.kind),
        start_timestamp: summary.start_timestamp,
        end_timestamp: Some(summary.end_timestamp),
        completion_timestamp: summary.completion_timestamp,
        progress: summary.progress,
        time_spent: summary.time_spent,
        extra_fields: summary.extra_fields.clone(),
        current_mastery_log: None,
    }
}

//
// ─── SESSION LOG ──────────────────────────────────────────────────────────────
//

#[must_use]
pub fn session_from_record(record: &SessionLogRecord) -> SessionLog {
    let progress = clamp_progress(record.progress);
    SessionLog {
        id: record.id.clone(),
        start_timestamp: record.start_timestamp,
        end_timestamp: record.end_timestamp.unwrap_or(record.start_timestamp),
        time_spent: record.time_spent,
        progress,
        extra_fields: extra_fields_or_empty(&record.extra_fields),
        total_time_at_last_save: record.time_spent,
        progress_at_last_save: progress,
    }
}

#[must_use]
pub fn session_to_record(
    session: &SessionLog,
    content: &ContentRef,
    user: Option<&UserId>,
) -> SessionLogRecord {
    SessionLogRecord {
        id: session.id.clone(),
        user: user.cloned(),
        channel_id: Some(content.channel_id.clone()),
        content_id: Some(content.content_id.clone()),
        kind: Some(content.kind),
        start_timestamp: session.start_timestamp,
        end_timestamp: Some(session.end_timestamp),
        progress: session.progress,
        time_spent: session.time_spent,
        extra_fields: session.extra_fields.clone(),
    }
}

//
// ─── MASTERY LOG ──────────────────────────────────────────────────────────────
//

#[must_use]
pub fn mastery_from_record(record: &MasteryLogRecord) -> MasteryLog {
    MasteryLog {
        id: record.id.clone(),
        summary_log: record.summary_log.clone(),
        start_timestamp: record.start_timestamp,
        end_timestamp: record.end_timestamp,
        completion_timestamp: record.completion_timestamp,
        mastery_level: record.mastery_level,
        complete: record.complete,
        response_history: record.response_history.clone(),
        total_attempts: record.total_attempts,
        mastery_criterion: record.mastery_criterion,
        persistence: Persistence::Remote,
    }
}

#[must_use]
pub fn mastery_to_record(mastery: &MasteryLog) -> MasteryLogRecord {
    MasteryLogRecord {
        id: mastery.id.clone(),
        summary_log: mastery.summary_log.clone(),
        start_timestamp: mastery.start_timestamp,
        end_timestamp: mastery.end_timestamp,
        completion_timestamp: mastery.completion_timestamp,
        mastery_level: mastery.mastery_level,
        complete: mastery.complete,
        response_history: mastery.response_history.clone(),
        total_attempts: mastery.total_attempts,
        mastery_criterion: mastery.mastery_criterion,
    }
}

//
// ─── ATTEMPT LOG ──────────────────────────────────────────────────────────────
//

#[must_use]
pub fn attempt_from_record(record: &AttemptLogRecord) -> AttemptLog {
    AttemptLog {
        id: record.id.clone(),
        mastery_log: record.mastery_log.clone(),
        session_log: record.session_log.clone(),
        item: record.item.clone(),
        start_timestamp: record.start_timestamp,
        end_timestamp: record.end_timestamp.unwrap_or(record.start_timestamp),
        completion_timestamp: record.completion_timestamp,
        complete: record.complete,
        time_spent: record.time_spent,
        correct: record.correct,
        answer: record.answer.clone(),
        simple_answer: record.simple_answer.clone(),
        interaction_history: record.interaction_history.clone(),
        hinted: record.hinted,
    }
}

#[must_use]
pub fn attempt_to_record(attempt: &AttemptLog) -> AttemptLogRecord {
    AttemptLogRecord {
        id: attempt.id.clone(),
        mastery_log: attempt.mastery_log.clone(),
        session_log: attempt.session_log.clone(),
        item: attempt.item.clone(),
        start_timestamp: attempt.start_timestamp,
        end_timestamp: Some(attempt.end_timestamp),
        completion_timestamp: attempt.completion_timestamp,
        complete: attempt.complete,
        time_spent: attempt.time_spent,
        correct: attempt.correct,
        answer: attempt.answer.clone(),
        simple_answer: attempt.simple_answer.clone(),
        interaction_history: attempt.interaction_history.clone(),
        hinted: attempt.hinted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ChannelId, ContentId, ContentKind, Interaction, InteractionType, ItemId,
        MasteryCriterion, MasteryLogId, SessionLogId, SummaryLogId,
    };
    use crate::time::fixed_now;
    use serde_json::json;

    fn content() -> ContentRef {
        ContentRef::new(ChannelId::new("ch"), ContentId::new("c1"), ContentKind::Video)
    }

    fn keys(value: &Value) -> Vec<String> {
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn summary_hydration_snapshots_prior_counters() {
        let record: SummaryLogRecord = SUMMARY_LOG
            .decode(json!({
                "id": "s1",
                "start_timestamp": "2024-01-01T00:00:00Z",
                "progress": 0.4,
                "time_spent": 120.0,
                "extra_fields": "{\"page\": 3}",
                "unexpected": "dropped"
            }))
            .unwrap();
        let summary = summary_from_record(&record);

        assert_eq!(summary.id, Some(SummaryLogId::new("s1")));
        assert_eq!(summary.progress_before_current_session, 0.4);
        assert_eq!(summary.time_spent_before_current_session, 120.0);
        assert_eq!(summary.end_timestamp, summary.start_timestamp);
        assert_eq!(summary.extra_fields, json!({"page": 3}));
    }

    #[test]
    fn summary_decode_carries_embedded_mastery() {
        let record: SummaryLogRecord = SUMMARY_LOG
            .decode(json!({
                "id": "s1",
                "start_timestamp": "2024-01-01T00:00:00Z",
                "currentmasterylog": {
                    "id": "m1",
                    "summarylog": "s1",
                    "start_timestamp": "2024-01-01T00:00:00Z",
                    "mastery_level": 2,
                    "complete": true,
                    "responsehistory": [true, false],
                    "totalattempts": 2
                }
            }))
            .unwrap();
        let mastery = mastery_from_record(record.current_mastery_log.as_ref().unwrap());
        assert_eq!(mastery.id, Some(MasteryLogId::new("m1")));
        assert_eq!(mastery.mastery_level, 2);
        assert_eq!(mastery.response_history, vec![true, false]);
        assert_eq!(mastery.persistence, Persistence::Remote);
    }

    #[test]
    fn summary_encode_uses_server_names_only() {
        let summary = SummaryLog::fresh(fixed_now());
        let value = SUMMARY_LOG
            .encode(&summary_to_record(&summary, &content(), None))
            .unwrap();
        assert!(value.get("currentmasterylog").is_none());
        assert!(value.get("id").is_none());
        assert_eq!(value["kind"], json!("video"));
        for key in keys(&value) {
            assert!(SUMMARY_LOG.local(&key).is_some(), "{key}");
        }
    }

    #[test]
    fn session_record_round_trips_through_table() {
        let mut session = SessionLog::fresh(fixed_now());
        session.id = Some(SessionLogId::new("x"));
        session.progress = 0.25;
        session.time_spent = 10.0;
        let value = SESSION_LOG
            .encode(&session_to_record(&session, &content(), None))
            .unwrap();
        let back = session_from_record(&SESSION_LOG.decode(value).unwrap());
        assert_eq!(back.progress, 0.25);
        assert_eq!(back.progress_at_last_save, 0.25);
        assert_eq!(back.total_time_at_last_save, 10.0);
    }

    #[test]
    fn mastery_encode_renames_fields() {
        let mut log = MasteryLog::new(
            SummaryLogId::new("s1"),
            3,
            MasteryCriterion::MOfN { m: 3, n: 5 },
            fixed_now(),
        );
        log.record_first_attempt(true, fixed_now());
        let value = MASTERY_LOG.encode(&mastery_to_record(&log)).unwrap();
        assert_eq!(value["summarylog"], json!("s1"));
        assert_eq!(value["responsehistory"], json!([true]));
        assert_eq!(value["totalattempts"], json!(1));
        assert!(value.get("summary_log").is_none());
    }

    #[test]
    fn attempt_encode_keeps_interactions() {
        let mut attempt = AttemptLog::new(
            ItemId::new("q1"),
            Some(MasteryLogId::new("m1")),
            Some(SessionLogId::new("se1")),
            fixed_now(),
        );
        attempt
            .interaction_history
            .push(Interaction::new(InteractionType::Hint, fixed_now()));
        let value = ATTEMPT_LOG.encode(&attempt_to_record(&attempt)).unwrap();
        assert_eq!(value["masterylog"], json!("m1"));
        assert_eq!(value["sessionlog"], json!("se1"));
        assert_eq!(value["interaction_history"][0]["type"], json!("hint"));

        let back = attempt_from_record(&ATTEMPT_LOG.decode(value).unwrap());
        assert_eq!(back, attempt);
    }
}
