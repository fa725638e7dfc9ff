use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::model::{AttemptLogId, ItemId, MasteryLogId, SessionLogId};
use crate::time::seconds_between;

//
// ─── INTERACTIONS ─────────────────────────────────────────────────────────────
//

/// Fields an interaction event may carry.
pub const INTERACTION_FIELDS: [&str; 4] = ["type", "correct", "answer", "timestamp"];

/// Kind of learner interaction recorded against an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Answer,
    Hint,
    Error,
}

impl FromStr for InteractionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(Self::Answer),
            "hint" => Ok(Self::Hint),
            "error" => Ok(Self::Error),
            other => Err(ValidationError::UnknownInteractionType(other.to_owned())),
        }
    }
}

/// One entry in an attempt's interaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    #[must_use]
    pub fn new(kind: InteractionType, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            correct: None,
            answer: None,
            timestamp,
        }
    }

    /// Validate a loosely-typed interaction payload.
    ///
    /// Every key must be one of [`INTERACTION_FIELDS`] and `type` must name a
    /// known [`InteractionType`]. A missing timestamp defaults to `now`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for disallowed keys, a missing or unknown
    /// type, or values of the wrong shape.
    pub fn from_fields(fields: &Map<String, Value>, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if let Some(key) = fields
            .keys()
            .find(|key| !INTERACTION_FIELDS.contains(&key.as_str()))
        {
            return Err(ValidationError::DisallowedField(key.clone()));
        }

        let kind = match fields.get("type") {
            None | Some(Value::Null) => return Err(ValidationError::MissingInteractionType),
            Some(Value::String(raw)) => raw.parse::<InteractionType>()?,
            Some(_) => return Err(ValidationError::InvalidField("type")),
        };

        let correct = match fields.get("correct") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
            Some(Value::Number(n)) => Some(n.as_f64().ok_or(ValidationError::InvalidField("correct"))?),
            Some(_) => return Err(ValidationError::InvalidField("correct")),
        };

        let timestamp = match fields.get("timestamp") {
            None | Some(Value::Null) => now,
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map_err(|_| ValidationError::InvalidField("timestamp"))?
                .with_timezone(&Utc),
            Some(_) => return Err(ValidationError::InvalidField("timestamp")),
        };

        Ok(Self {
            kind,
            correct,
            answer: fields.get("answer").filter(|v| !v.is_null()).cloned(),
            timestamp,
        })
    }
}

//
// ─── ATTEMPT LOG ──────────────────────────────────────────────────────────────
//

/// One learner's work on a single assessment item.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptLog {
    pub id: Option<AttemptLogId>,
    pub mastery_log: Option<MasteryLogId>,
    pub session_log: Option<SessionLogId>,
    pub item: ItemId,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub complete: bool,
    pub time_spent: f64,
    pub correct: f64,
    pub answer: Option<Value>,
    pub simple_answer: String,
    pub interaction_history: Vec<Interaction>,
    pub hinted: bool,
}

impl AttemptLog {
    #[must_use]
    pub fn new(
        item: ItemId,
        mastery_log: Option<MasteryLogId>,
        session_log: Option<SessionLogId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            mastery_log,
            session_log,
            item,
            start_timestamp: now,
            end_timestamp: now,
            completion_timestamp: None,
            complete: false,
            time_spent: 0.0,
            correct: 0.0,
            answer: None,
            simple_answer: String::new(),
            interaction_history: Vec::new(),
            hinted: false,
        }
    }

    /// Move the end timestamp and recompute time spent.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.end_timestamp = at;
        self.time_spent = seconds_between(self.start_timestamp, at);
    }
}
