use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

use crate::client::{Collection, Filter, ResourceClient, ResourceError, record_id};
use crate::config::ApiConfig;

fn transport(e: reqwest::Error) -> ResourceError {
    ResourceError::Transport(e.to_string())
}

/// REST client for the resource API.
///
/// Keeps a session cookie between calls and caches single-record fetches
/// until they are saved, deleted or the cache is cleared.
pub struct HttpResourceClient {
    client: Client,
    config: ApiConfig,
    cache: Mutex<HashMap<(Collection, String), Value>>,
}

impl HttpResourceClient {
    /// Build a client for the configured API.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, ResourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<(Collection, String), Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn collection_url(&self, collection: Collection) -> Result<Url, ResourceError> {
        self.config
            .base_url
            .join(&format!("{}/", collection.path()))
            .map_err(|e| ResourceError::Transport(e.to_string()))
    }

    fn record_url(&self, collection: Collection, id: &str) -> Result<Url, ResourceError> {
        self.config
            .base_url
            .join(&format!("{}/{id}/", collection.path()))
            .map_err(|e| ResourceError::Transport(e.to_string()))
    }

    async fn read_json(response: Response) -> Result<Value, ResourceError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ResourceError::from_status(status.as_u16(), message));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ResourceError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn fetch_one(
        &self,
        collection: Collection,
        id: &str,
        force: bool,
    ) -> Result<Value, ResourceError> {
        let key = (collection, id.to_owned());
        let cached = if force {
            None
        } else {
            self.cache().get(&key).cloned()
        };
        if let Some(cached) = cached {
            debug!(%collection, id, "resource cache hit");
            return Ok(cached);
        }
        let url = self.record_url(collection, id)?;
        debug!(%collection, id, "fetching record");
        let response = self.client.get(url).send().await.map_err(transport)?;
        let record = Self::read_json(response).await?;
        self.cache().insert(key, record.clone());
        Ok(record)
    }

    async fn fetch_collection(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<Value>, ResourceError> {
        let mut url = self.collection_url(collection)?;
        if !filter.is_empty() {
            url.query_pairs_mut().extend_pairs(filter.params());
        }
        debug!(%collection, "fetching collection");
        let response = self.client.get(url).send().await.map_err(transport)?;
        match Self::read_json(response).await? {
            Value::Array(records) => Ok(records),
            Value::Null => Ok(Vec::new()),
            _ => Err(ResourceError::Serialization(format!(
                "expected a list from {collection}"
            ))),
        }
    }

    async fn create(&self, collection: Collection, payload: Value) -> Result<Value, ResourceError> {
        let url = self.collection_url(collection)?;
        debug!(%collection, "creating record");
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;
        let record = Self::read_json(response).await?;
        if let Ok(id) = record_id(&record) {
            self.cache().insert((collection, id), record.clone());
        }
        Ok(record)
    }

    async fn save(
        &self,
        collection: Collection,
        id: &str,
        payload: Value,
    ) -> Result<Value, ResourceError> {
        let url = self.record_url(collection, id)?;
        self.cache().remove(&(collection, id.to_owned()));
        debug!(%collection, id, "saving record");
        let response = self
            .client
            .patch(url)
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;
        Self::read_json(response).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), ResourceError> {
        let url = self.record_url(collection, id)?;
        self.cache().remove(&(collection, id.to_owned()));
        debug!(%collection, id, "deleting record");
        let response = self.client.delete(url).send().await.map_err(transport)?;
        Self::read_json(response).await.map(|_| ())
    }

    fn clear_cache(&self) {
        self.cache().clear();
    }
}
