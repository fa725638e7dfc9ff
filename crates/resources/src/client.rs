use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by resource clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResourceError {
    #[error("not found")]
    NotFound,

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ResourceError {
    /// HTTP-like status code carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ResourceError::NotFound => Some(404),
            ResourceError::Status { status, .. } => Some(*status),
            ResourceError::Transport(_) | ResourceError::Serialization(_) => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 404 {
            ResourceError::NotFound
        } else {
            ResourceError::Status {
                status,
                message: message.into(),
            }
        }
    }
}

/// Named REST collections the logging layer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Session,
    Facility,
    FacilityDataset,
    Channel,
    ContentSessionLog,
    ContentSummaryLog,
    MasteryLog,
    AttemptLog,
    UserProgress,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Session,
        Collection::Facility,
        Collection::FacilityDataset,
        Collection::Channel,
        Collection::ContentSessionLog,
        Collection::ContentSummaryLog,
        Collection::MasteryLog,
        Collection::AttemptLog,
        Collection::UserProgress,
    ];

    /// URL path segment of the collection.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Collection::Session => "session",
            Collection::Facility => "facility",
            Collection::FacilityDataset => "facilitydataset",
            Collection::Channel => "channel",
            Collection::ContentSessionLog => "contentsessionlog",
            Collection::ContentSummaryLog => "contentsummarylog",
            Collection::MasteryLog => "masterylog",
            Collection::AttemptLog => "attemptlog",
            Collection::UserProgress => "userprogress",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Equality filter applied when fetching a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    params: BTreeMap<String, String>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(field.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether a record satisfies every condition.
    ///
    /// Scalars compare by their string form; missing fields never match.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        self.params.iter().all(|(field, expected)| {
            match record.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            }
        })
    }
}

/// CRUD contract over named collections.
///
/// Records travel as plain JSON objects; typed decoding happens in callers.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch a single record. `force` bypasses any client-side cache.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::NotFound` if missing, or other request failures.
    async fn fetch_one(
        &self,
        collection: Collection,
        id: &str,
        force: bool,
    ) -> Result<Value, ResourceError>;

    /// Fetch every record matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError` if the request fails.
    async fn fetch_collection(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, ResourceError>;

    /// Create a record and return it with its assigned identity.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError` if the request fails.
    async fn create(&self, collection: Collection, payload: Value) -> Result<Value, ResourceError>;

    /// Save a partial or full payload onto an existing record.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::NotFound` if the record does not exist.
    async fn save(
        &self,
        collection: Collection,
        id: &str,
        payload: Value,
    ) -> Result<Value, ResourceError>;

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError` if the request fails.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), ResourceError>;

    /// Drop every cached record.
    fn clear_cache(&self);
}

/// Read the `id` of a returned record.
///
/// # Errors
///
/// Returns `ResourceError::Serialization` if the record has no string or numeric id.
pub fn record_id(record: &Value) -> Result<String, ResourceError> {
    match record.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ResourceError::Serialization("record is missing an id".into())),
    }
}
