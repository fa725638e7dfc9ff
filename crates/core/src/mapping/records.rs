//! Server-side shapes of the log collections.
//!
//! Rust field names are the local names; serde renames carry the server
//! names listed in the matching [`FieldMap`](super::FieldMap).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    AttemptLogId, ChannelId, ContentId, ContentKind, Interaction, ItemId, MasteryCriterion,
    MasteryLogId, SessionLogId, SummaryLogId, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SummaryLogId>,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub time_spent: f64,
    #[serde(default)]
    pub extra_fields: Value,
    /// Embedded by the server on reads; never written back.
    #[serde(rename = "currentmasterylog", default, skip_serializing)]
    pub current_mastery_log: Option<MasteryLogRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionLogId>,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub time_spent: f64,
    #[serde(default)]
    pub extra_fields: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryLogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MasteryLogId>,
    #[serde(rename = "summarylog", default)]
    pub summary_log: Option<SummaryLogId>,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "initial_level")]
    pub mastery_level: u32,
    #[serde(default)]
    pub complete: bool,
    #[serde(rename = "responsehistory", default)]
    pub response_history: Vec<bool>,
    #[serde(rename = "totalattempts", default)]
    pub total_attempts: u32,
    #[serde(default)]
    pub mastery_criterion: Option<MasteryCriterion>,
}

fn initial_level() -> u32 {
    crate::model::MasteryLog::INITIAL_LEVEL
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptLogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AttemptLogId>,
    #[serde(rename = "masterylog", default)]
    pub mastery_log: Option<MasteryLogId>,
    #[serde(rename = "sessionlog", default)]
    pub session_log: Option<SessionLogId>,
    pub item: ItemId,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub time_spent: f64,
    #[serde(default)]
    pub correct: f64,
    #[serde(default)]
    pub answer: Option<Value>,
    #[serde(default)]
    pub simple_answer: String,
    #[serde(default)]
    pub interaction_history: Vec<Interaction>,
    #[serde(default)]
    pub hinted: bool,
}
