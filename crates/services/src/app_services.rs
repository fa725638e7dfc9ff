use std::sync::Arc;

use resources::ResourceClient;

use crate::Clock;
use crate::channels::ChannelService;
use crate::config::TrackerConfig;
use crate::content_session::ContentSessionCoordinator;
use crate::cookies::CookieJar;
use crate::epoch::PageToken;
use crate::mastery::MasteryManager;
use crate::session_controller::SessionController;
use crate::store::{CoreState, Store};
use crate::tracking::ProgressTracker;

/// Assembles every service over one store and one resource client.
#[derive(Clone)]
pub struct AppServices {
    store: Store,
    session: Arc<SessionController>,
    channels: Arc<ChannelService>,
    content: Arc<ContentSessionCoordinator>,
    tracker: ProgressTracker,
    mastery: MasteryManager,
}

impl AppServices {
    #[must_use]
    pub fn new(
        client: Arc<dyn ResourceClient>,
        cookies: Arc<dyn CookieJar>,
        clock: Clock,
        config: TrackerConfig,
    ) -> Self {
        let store = Store::new();
        let session = Arc::new(SessionController::new(store.clone(), Arc::clone(&client)));
        let channels = Arc::new(ChannelService::new(
            store.clone(),
            Arc::clone(&client),
            cookies,
        ));
        let content = Arc::new(ContentSessionCoordinator::new(
            store.clone(),
            Arc::clone(&client),
            clock,
        ));
        let tracker = ProgressTracker::new(store.clone(), Arc::clone(&client), clock, config);
        let mastery = MasteryManager::new(store.clone(), client, clock);

        Self {
            store,
            session,
            channels,
            content,
            tracker,
            mastery,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn state(&self) -> CoreState {
        self.store.snapshot()
    }

    #[must_use]
    pub fn session(&self) -> Arc<SessionController> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn channels(&self) -> Arc<ChannelService> {
        Arc::clone(&self.channels)
    }

    #[must_use]
    pub fn content(&self) -> Arc<ContentSessionCoordinator> {
        Arc::clone(&self.content)
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn mastery(&self) -> &MasteryManager {
        &self.mastery
    }

    /// Mark a page navigation; writes started earlier stop applying results.
    pub fn begin_page(&self) -> PageToken {
        self.store.epoch().advance()
    }
}
