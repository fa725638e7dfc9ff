use std::sync::Arc;

use progress_core::mapping::decode_record;
use progress_core::model::{Channel, ChannelId};
use resources::{Collection, Filter, ResourceClient};
use tracing::{debug, info};

use crate::cookies::CookieJar;
use crate::error::ChannelError;
use crate::store::Store;

/// Cookie remembering the last selected channel.
pub const CHANNEL_COOKIE: &str = "currentChannelId";

/// Channel list and current-channel selection.
#[derive(Clone)]
pub struct ChannelService {
    store: Store,
    client: Arc<dyn ResourceClient>,
    cookies: Arc<dyn CookieJar>,
}

impl ChannelService {
    #[must_use]
    pub fn new(store: Store, client: Arc<dyn ResourceClient>, cookies: Arc<dyn CookieJar>) -> Self {
        Self {
            store,
            client,
            cookies,
        }
    }

    /// Load channels and pick the current one.
    ///
    /// Prefers `preferred`, then the remembered cookie, then the first
    /// channel. Returns the selected channel, if any exist.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError` if channels cannot be fetched or the cookie
    /// cannot be written. Fetch failures are also recorded as the core error.
    pub async fn set_channel_info(
        &self,
        preferred: Option<ChannelId>,
    ) -> Result<Option<ChannelId>, ChannelError> {
        let records = match self
            .client
            .fetch_collection(Collection::Channel, &Filter::new())
            .await
        {
            Ok(records) => records,
            Err(err) => {
                self.store.handle_api_error(&err);
                return Err(err.into());
            }
        };
        let channels = records
            .into_iter()
            .map(|record| decode_record::<Channel>("channel", record))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = channels.len(), "loaded channels");

        let remembered = self.cookies.get(CHANNEL_COOKIE).map(ChannelId::new);
        let target = preferred
            .into_iter()
            .chain(remembered)
            .find(|id| channels.iter().any(|channel| channel.id == *id))
            .or_else(|| channels.first().map(|channel| channel.id.clone()));

        self.store.update(|state| state.channels.list = channels);
        match target {
            Some(id) => {
                self.switch_channel(&id)?;
                Ok(Some(id))
            }
            None => {
                self.store.update(|state| state.channels.current = None);
                self.cookies.remove(CHANNEL_COOKIE)?;
                Ok(None)
            }
        }
    }

    /// Make `id` the current channel and remember it.
    ///
    /// An unknown id clears the selection and forgets the cookie. Returns
    /// whether the channel was known.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Cookie` if the cookie cannot be updated.
    pub fn switch_channel(&self, id: &ChannelId) -> Result<bool, ChannelError> {
        let known = self.store.update(|state| {
            let known = state.channels.list.iter().any(|channel| channel.id == *id);
            state.channels.current = known.then(|| id.clone());
            known
        });
        if known {
            self.cookies.set(CHANNEL_COOKIE, id.as_str())?;
            info!(channel_id = %id, "switched channel");
        } else {
            self.cookies.remove(CHANNEL_COOKIE)?;
        }
        Ok(known)
    }

    #[must_use]
    pub fn current_channel(&self) -> Option<Channel> {
        self.store.read(|state| {
            let current = state.channels.current.as_ref()?;
            state
                .channels
                .list
                .iter()
                .find(|channel| channel.id == *current)
                .cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::MemoryCookieJar;
    use resources::InMemoryResources;
    use serde_json::json;

    fn service() -> (Store, InMemoryResources, MemoryCookieJar, ChannelService) {
        let store = Store::new();
        let backend = InMemoryResources::new();
        backend.seed(Collection::Channel, json!({"id": "a", "name": "Arithmetic"}));
        backend.seed(Collection::Channel, json!({"id": "b", "name": "Biology"}));
        let cookies = MemoryCookieJar::new();
        let service = ChannelService::new(
            store.clone(),
            Arc::new(backend.clone()),
            Arc::new(cookies.clone()),
        );
        (store, backend, cookies, service)
    }

    #[tokio::test]
    async fn defaults_to_first_channel() {
        let (_store, _backend, cookies, service) = service();
        let current = service.set_channel_info(None).await.unwrap();
        assert_eq!(current, Some(ChannelId::new("a")));
        assert_eq!(cookies.get(CHANNEL_COOKIE).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn remembered_cookie_wins_over_default() {
        let (_store, _backend, cookies, service) = service();
        cookies.set(CHANNEL_COOKIE, "b").unwrap();
        let current = service.set_channel_info(None).await.unwrap();
        assert_eq!(current, Some(ChannelId::new("b")));
        assert_eq!(service.current_channel().unwrap().name, "Biology");
    }

    #[tokio::test]
    async fn unknown_channel_clears_cookie() {
        let (store, _backend, cookies, service) = service();
        service.set_channel_info(Some(ChannelId::new("b"))).await.unwrap();

        assert!(!service.switch_channel(&ChannelId::new("zz")).unwrap());
        assert_eq!(cookies.get(CHANNEL_COOKIE), None);
        assert!(store.read(|s| s.channels.current.is_none()));
        assert!(service.current_channel().is_none());
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded() {
        let (store, backend, _cookies, service) = service();
        backend.fail_next(Collection::Channel, 502);
        assert!(matches!(
            service.set_channel_info(None).await,
            Err(ChannelError::Api(_))
        ));
        assert!(store.read(|s| s.status.error.is_some()));
    }
}
