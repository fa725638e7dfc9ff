use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use progress_core::model::CURRENT_SESSION_ID;

use crate::client::{Collection, Filter, ResourceClient, ResourceError, record_id};

/// Operation recorded by [`InMemoryResources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchOne,
    FetchCollection,
    Create,
    Save,
    Delete,
}

/// One call made against the in-memory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub collection: Collection,
    pub id: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    session: Value,
}

#[derive(Default)]
struct Inner {
    records: HashMap<Collection, Vec<Value>>,
    accounts: HashMap<String, Account>,
    calls: Vec<Call>,
    failures: HashMap<Collection, VecDeque<u16>>,
    cache_clears: usize,
}

impl Inner {
    fn take_failure(&mut self, collection: Collection) -> Result<(), ResourceError> {
        match self.failures.get_mut(&collection).and_then(VecDeque::pop_front) {
            Some(status) => Err(ResourceError::from_status(status, "injected failure")),
            None => Ok(()),
        }
    }

    fn position(&self, collection: Collection, id: &str) -> Option<usize> {
        self.records
            .get(&collection)?
            .iter()
            .position(|record| record_id(record).is_ok_and(|rid| rid == id))
    }
}

/// In-memory resource backend for tests and offline prototyping.
///
/// Assigns uuid identities on create, merges partial saves, records every
/// call and can fail the next call on a collection with a given status.
#[derive(Clone, Default)]
pub struct InMemoryResources {
    inner: Arc<Mutex<Inner>>,
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl InMemoryResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record directly, assigning an id when it has none.
    ///
    /// Returns the stored id.
    pub fn seed(&self, collection: Collection, mut record: Value) -> String {
        let id = record_id(&record).unwrap_or_else(|_| new_id());
        if let Value::Object(map) = &mut record {
            map.insert("id".into(), Value::String(id.clone()));
        }
        let mut guard = self.lock();
        let position = guard.position(collection, &id);
        let records = guard.records.entry(collection).or_default();
        match position {
            Some(index) => records[index] = record,
            None => records.push(record),
        }
        id
    }

    /// Accept `username`/`password` on session create, answering with `session`.
    pub fn register_account(&self, username: &str, password: &str, session: Value) {
        self.lock().accounts.insert(
            username.to_owned(),
            Account {
                password: password.to_owned(),
                session,
            },
        );
    }

    /// Fail the next call against `collection` with `status`.
    pub fn fail_next(&self, collection: Collection, status: u16) {
        self.lock()
            .failures
            .entry(collection)
            .or_default()
            .push_back(status);
    }

    #[must_use]
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .records
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn record(&self, collection: Collection, id: &str) -> Option<Value> {
        let guard = self.lock();
        let index = guard.position(collection, id)?;
        guard.records.get(&collection).map(|records| records[index].clone())
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls of `operation` against `collection`.
    #[must_use]
    pub fn count(&self, operation: Operation, collection: Collection) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation && call.collection == collection)
            .count()
    }

    #[must_use]
    pub fn cache_clears(&self) -> usize {
        self.lock().cache_clears
    }

    fn create_session(inner: &mut Inner, payload: &Value) -> Result<Value, ResourceError> {
        let field = |name: &str| payload.get(name).and_then(Value::as_str).unwrap_or_default();
        let account = inner
            .accounts
            .get(field("username"))
            .filter(|account| account.password == field("password"))
            .cloned()
            .ok_or_else(|| ResourceError::from_status(401, "invalid username or password"))?;

        let mut session = account.session;
        if let Value::Object(map) = &mut session {
            map.insert("id".into(), Value::String(CURRENT_SESSION_ID.into()));
        }
        let records = inner.records.entry(Collection::Session).or_default();
        records.clear();
        records.push(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl ResourceClient for InMemoryResources {
    async fn fetch_one(
        &self,
        collection: Collection,
        id: &str,
        _force: bool,
    ) -> Result<Value, ResourceError> {
        let mut guard = self.lock();
        guard.calls.push(Call {
            operation: Operation::FetchOne,
            collection,
            id: Some(id.to_owned()),
            payload: None,
        });
        guard.take_failure(collection)?;
        let index = guard.position(collection, id).ok_or(ResourceError::NotFound)?;
        Ok(guard.records[&collection][index].clone())
    }

    async fn fetch_collection(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, ResourceError> {
        let mut guard = self.lock();
        guard.calls.push(Call {
            operation: Operation::FetchCollection,
            collection,
            id: None,
            payload: None,
        });
        guard.take_failure(collection)?;
        Ok(guard
            .records
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, collection: Collection, payload: Value) -> Result<Value, ResourceError> {
        let mut guard = self.lock();
        guard.calls.push(Call {
            operation: Operation::Create,
            collection,
            id: None,
            payload: Some(payload.clone()),
        });
        guard.take_failure(collection)?;

        if collection == Collection::Session {
            return Self::create_session(&mut guard, &payload);
        }

        let Value::Object(fields) = payload else {
            return Err(ResourceError::Serialization("payload must be an object".into()));
        };
        let mut record = Map::new();
        record.insert("id".into(), Value::String(new_id()));
        for (key, value) in fields {
            if key != "id" {
                record.insert(key, value);
            }
        }
        let record = Value::Object(record);
        guard.records.entry(collection).or_default().push(record.clone());
        Ok(record)
    }

    async fn save(
        &self,
        collection: Collection,
        id: &str,
        payload: Value,
    ) -> Result<Value, ResourceError> {
        let mut guard = self.lock();
        guard.calls.push(Call {
            operation: Operation::Save,
            collection,
            id: Some(id.to_owned()),
            payload: Some(payload.clone()),
        });
        guard.take_failure(collection)?;
        let index = guard.position(collection, id).ok_or(ResourceError::NotFound)?;
        let records = guard.records.entry(collection).or_default();
        let record = &mut records[index];
        merge(record, payload);
        if let Value::Object(map) = &mut *record {
            map.insert("id".into(), Value::String(id.to_owned()));
        }
        Ok(record.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), ResourceError> {
        let mut guard = self.lock();
        guard.calls.push(Call {
            operation: Operation::Delete,
            collection,
            id: Some(id.to_owned()),
            payload: None,
        });
        guard.take_failure(collection)?;
        let index = guard.position(collection, id).ok_or(ResourceError::NotFound)?;
        guard.records.entry(collection).or_default().remove(index);
        Ok(())
    }

    fn clear_cache(&self) {
        self.lock().cache_clears += 1;
    }
}
