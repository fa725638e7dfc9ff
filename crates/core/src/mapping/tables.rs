use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::MappingError;

/// Compile-time rename table between local field names and server field names.
///
/// Only fields listed here travel in either direction; anything else in a
/// payload is dropped.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub name: &'static str,
    pub pairs: &'static [(&'static str, &'static str)],
}

impl FieldMap {
    #[must_use]
    pub fn remote(&self, local: &str) -> Option<&'static str> {
        self.pairs
            .iter()
            .find(|(l, _)| *l == local)
            .map(|(_, remote)| *remote)
    }

    #[must_use]
    pub fn local(&self, remote: &str) -> Option<&'static str> {
        self.pairs
            .iter()
            .find(|(_, r)| *r == remote)
            .map(|(local, _)| *local)
    }

    /// Keep only keys that appear on the server side of the table.
    ///
    /// # Errors
    ///
    /// Returns `MappingError::NotAnObject` if `value` is not a JSON object.
    pub fn whitelist(&self, value: Value) -> Result<Map<String, Value>, MappingError> {
        let Value::Object(map) = value else {
            return Err(MappingError::NotAnObject(self.name));
        };
        Ok(map
            .into_iter()
            .filter(|(key, _)| self.local(key).is_some())
            .collect())
    }

    /// Serialize a record and strip anything outside the table.
    ///
    /// # Errors
    ///
    /// Returns `MappingError` if the record does not serialize to an object.
    pub fn encode<T: Serialize>(&self, record: &T) -> Result<Value, MappingError> {
        let value = serde_json::to_value(record).map_err(|source| MappingError::Encode {
            what: self.name,
            source,
        })?;
        Ok(Value::Object(self.whitelist(value)?))
    }

    /// Whitelist a server payload and decode it into a record.
    ///
    /// # Errors
    ///
    /// Returns `MappingError` if the payload is not an object or has the wrong shape.
    pub fn decode<T: DeserializeOwned>(&self, value: Value) -> Result<T, MappingError> {
        let map = self.whitelist(value)?;
        serde_json::from_value(Value::Object(map)).map_err(|source| MappingError::Decode {
            what: self.name,
            source,
        })
    }
}

/// Decode a server payload that has no rename table.
///
/// # Errors
///
/// Returns `MappingError::Decode` when the payload has the wrong shape.
pub fn decode_record<T: DeserializeOwned>(what: &'static str, value: Value) -> Result<T, MappingError> {
    serde_json::from_value(value).map_err(|source| MappingError::Decode { what, source })
}

pub const SUMMARY_LOG: FieldMap = FieldMap {
    name: "content summary log",
    pairs: &[
        ("id", "id"),
        ("user", "user"),
        ("channel_id", "channel_id"),
        ("content_id", "content_id"),
        ("kind", "kind"),
        ("start_timestamp", "start_timestamp"),
        ("end_timestamp", "end_timestamp"),
        ("completion_timestamp", "completion_timestamp"),
        ("progress", "progress"),
        ("time_spent", "time_spent"),
        ("extra_fields", "extra_fields"),
        ("current_mastery_log", "currentmasterylog"),
    ],
};

pub const SESSION_LOG: FieldMap = FieldMap {
    name: "content session log",
    pairs: &[
        ("id", "id"),
        ("user", "user"),
        ("channel_id", "channel_id"),
        ("content_id", "content_id"),
        ("kind", "kind"),
        ("start_timestamp", "start_timestamp"),
        ("end_timestamp", "end_timestamp"),
        ("progress", "progress"),
        ("time_spent", "time_spent"),
        ("extra_fields", "extra_fields"),
    ],
};

pub const MASTERY_LOG: FieldMap = FieldMap {
    name: "mastery log",
    pairs: &[
        ("id", "id"),
        ("summary_log", "summarylog"),
        ("start_timestamp", "start_timestamp"),
        ("end_timestamp", "end_timestamp"),
        ("completion_timestamp", "completion_timestamp"),
        ("mastery_level", "mastery_level"),
        ("complete", "complete"),
        ("response_history", "responsehistory"),
        ("total_attempts", "totalattempts"),
        ("mastery_criterion", "mastery_criterion"),
    ],
};

pub const ATTEMPT_LOG: FieldMap = FieldMap {
    name: "attempt log",
    pairs: &[
        ("id", "id"),
        ("mastery_log", "masterylog"),
        ("session_log", "sessionlog"),
        ("item", "item"),
        ("start_timestamp", "start_timestamp"),
        ("end_timestamp", "end_timestamp"),
        ("completion_timestamp", "completion_timestamp"),
        ("complete", "complete"),
        ("time_spent", "time_spent"),
        ("correct", "correct"),
        ("answer", "answer"),
        ("simple_answer", "simple_answer"),
        ("interaction_history", "interaction_history"),
        ("hinted", "hinted"),
    ],
};
