//! Single-owner application state shared by every service.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use progress_core::model::{
    AttemptLog, AttemptLogId, Channel, ChannelId, ContentRef, FacilityConfig, ItemId, MasteryLog,
    Session, SessionLog, SummaryLog, UserId,
};
use progress_core::MappingError;
use resources::ResourceError;
use tracing::warn;

use crate::epoch::PageEpoch;

/// Points awarded for fully completing one piece of content.
pub const POINTS_PER_CONTENT: f64 = 500.0;

/// Logs for the content currently being viewed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingState {
    pub content: Option<ContentRef>,
    /// Owner attached to new records; `None` for anonymous and privileged sessions.
    pub user: Option<UserId>,
    pub summary: Option<SummaryLog>,
    pub session: Option<SessionLog>,
    pub mastery: Option<MasteryLog>,
    pub attempt: Option<AttemptLog>,
    /// Remote ids of attempts already created during this page.
    pub attempt_ids: HashMap<ItemId, AttemptLogId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreStatus {
    pub loading: bool,
    /// Serialized description of the last API failure.
    pub error: Option<String>,
    pub login_error: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub list: Vec<Channel>,
    pub current: Option<ChannelId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreState {
    pub session: Session,
    pub status: CoreStatus,
    pub channels: ChannelState,
    pub total_progress: Option<f64>,
    pub facility_config: Option<FacilityConfig>,
    pub logging: LoggingState,
}

impl CoreState {
    /// Points derived from the user's aggregate progress.
    #[must_use]
    pub fn total_points(&self) -> u64 {
        let progress = self.total_progress.unwrap_or_default().max(0.0);
        // Non-negative and finite after the max above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let points = (progress * POINTS_PER_CONTENT).floor() as u64;
        points
    }
}

/// Shared handle to [`CoreState`] plus the page epoch.
#[derive(Debug, Clone, Default)]
pub struct Store {
    state: Arc<Mutex<CoreState>>,
    epoch: PageEpoch,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> CoreState {
        self.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&CoreState) -> R) -> R {
        f(&self.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        f(&mut self.lock())
    }

    #[must_use]
    pub fn epoch(&self) -> &PageEpoch {
        &self.epoch
    }

    pub fn set_loading(&self, loading: bool) {
        self.lock().status.loading = loading;
    }

    /// Record a failed request as the core error and stop the loading state.
    pub fn handle_api_error(&self, err: &ResourceError) {
        warn!(error = %err, "api request failed");
        self.record_error(err.status(), err);
    }

    /// Record a response that could not be read as the core error.
    pub fn handle_mapping_error(&self, err: &MappingError) {
        warn!(error = %err, "api response could not be mapped");
        self.record_error(None, err);
    }

    fn record_error(&self, status: Option<u16>, err: &dyn fmt::Display) {
        let message = serde_json::json!({
            "status": status,
            "message": err.to_string(),
        })
        .to_string();
        let mut state = self.lock();
        state.status.error = Some(message);
        state.status.loading = false;
    }
}
