use std::sync::Arc;

use progress_core::mapping::{
    SESSION_LOG, SUMMARY_LOG, SummaryLogRecord, mastery_from_record, session_to_record,
    summary_from_record, summary_to_record,
};
use progress_core::model::{
    ContentRef, SessionLog, SessionLogId, SummaryLog, SummaryLogId, UserId,
};
use progress_core::Clock;
use resources::{Collection, Filter, ResourceClient, record_id};
use tracing::{debug, info};

use crate::error::LoggingError;
use crate::store::{LoggingState, Store};

/// Where the summary log for a content session came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarySource {
    /// Hydrated from the user's existing record.
    Existing(Option<SummaryLogId>),
    Created(SummaryLogId),
    /// Anonymous or privileged viewer; no summary is kept.
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSessionStarted {
    pub summary: SummarySource,
    pub session_id: SessionLogId,
}

/// Starts the logs for a newly opened piece of content.
#[derive(Clone)]
pub struct ContentSessionCoordinator {
    store: Store,
    client: Arc<dyn ResourceClient>,
    clock: Clock,
}

impl ContentSessionCoordinator {
    #[must_use]
    pub fn new(store: Store, client: Arc<dyn ResourceClient>, clock: Clock) -> Self {
        Self {
            store,
            client,
            clock,
        }
    }

    /// Reset logging state and open summary and session logs for `content`.
    ///
    /// The reset starts a new page epoch, so mastery and attempt writes still
    /// in flight for the previous content resolve as stale.
    ///
    /// Tracked users get their existing summary log hydrated (with any
    /// embedded mastery log) or a new one created. Every viewer gets a new
    /// session log. Resolves once both paths settle.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::Api` or `LoggingError::Mapping` if either path
    /// fails; the other path still runs to completion.
    pub async fn init_content_session(
        &self,
        content: ContentRef,
    ) -> Result<ContentSessionStarted, LoggingError> {
        let now = self.clock.now();
        let user = self.store.update(|state| {
            self.store.epoch().advance();
            let user = state.session.log_user();
            state.logging = LoggingState {
                content: Some(content.clone()),
                user: user.clone(),
                session: Some(SessionLog::fresh(now)),
                ..LoggingState::default()
            };
            user
        });
        debug!(content_id = %content.content_id, tracked = user.is_some(), "initializing content session");

        let (summary, session) = tokio::join!(
            self.open_summary(&content, user.as_ref()),
            self.open_session(&content, user.as_ref()),
        );
        let started = ContentSessionStarted {
            summary: summary?,
            session_id: session?,
        };
        info!(content_id = %content.content_id, "content session started");
        Ok(started)
    }

    fn apply_if_current(&self, content: &ContentRef, f: impl FnOnce(&mut LoggingState)) {
        self.store.update(|state| {
            if state.logging.content.as_ref() == Some(content) {
                f(&mut state.logging);
            } else {
                debug!("content changed before log request resolved");
            }
        });
    }

    async fn open_summary(
        &self,
        content: &ContentRef,
        user: Option<&UserId>,
    ) -> Result<SummarySource, LoggingError> {
        let Some(user) = user else {
            return Ok(SummarySource::Untracked);
        };
        let filter = Filter::new()
            .with("content_id", &content.content_id)
            .with("user", user);
        let found = self
            .client
            .fetch_collection(Collection::ContentSummaryLog, &filter)
            .await?;

        if let Some(existing) = found.into_iter().next() {
            let record: SummaryLogRecord = SUMMARY_LOG.decode(existing)?;
            let summary = summary_from_record(&record);
            let mastery = record.current_mastery_log.as_ref().map(mastery_from_record);
            let id = summary.id.clone();
            self.apply_if_current(content, |logging| {
                logging.summary = Some(summary);
                if mastery.is_some() {
                    logging.mastery = mastery;
                }
            });
            return Ok(SummarySource::Existing(id));
        }

        let fresh = SummaryLog::fresh(self.clock.now());
        let payload = SUMMARY_LOG.encode(&summary_to_record(&fresh, content, Some(user)))?;
        self.apply_if_current(content, |logging| logging.summary = Some(fresh));
        let created = self
            .client
            .create(Collection::ContentSummaryLog, payload)
            .await?;
        let id = SummaryLogId::new(record_id(&created)?);
        self.apply_if_current(content, |logging| {
            if let Some(summary) = logging.summary.as_mut() {
                summary.id = Some(id.clone());
            }
        });
        Ok(SummarySource::Created(id))
    }

    async fn open_session(
        &self,
        content: &ContentRef,
        user: Option<&UserId>,
    ) -> Result<SessionLogId, LoggingError> {
        let payload = self.store.read(|state| {
            let fresh = state
                .logging
                .session
                .clone()
                .unwrap_or_else(|| SessionLog::fresh(self.clock.now()));
            SESSION_LOG.encode(&session_to_record(&fresh, content, user))
        })?;
        let created = self
            .client
            .create(Collection::ContentSessionLog, payload)
            .await?;
        let id = SessionLogId::new(record_id(&created)?);
        self.apply_if_current(content, |logging| {
            if let Some(session) = logging.session.as_mut() {
                session.id = Some(id.clone());
            }
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ChannelId, ContentId, ContentKind, Session, UserKind};
    use progress_core::time::fixed_clock;
    use resources::{InMemoryResources, Operation};
    use serde_json::json;

    fn content() -> ContentRef {
        ContentRef::new(ChannelId::new("ch"), ContentId::new("c1"), ContentKind::Exercise)
    }

    fn coordinator(session: Session) -> (Store, InMemoryResources, ContentSessionCoordinator) {
        let store = Store::new();
        store.update(|state| state.session = session);
        let backend = InMemoryResources::new();
        let coordinator =
            ContentSessionCoordinator::new(store.clone(), Arc::new(backend.clone()), fixed_clock());
        (store, backend, coordinator)
    }

    fn learner() -> Session {
        Session {
            user_id: Some(UserId::new("u1")),
            username: "ann".into(),
            kind: vec![UserKind::Learner],
            ..Session::anonymous()
        }
    }

    #[tokio::test]
    async fn existing_summary_is_hydrated_with_mastery() {
        let (store, backend, coordinator) = coordinator(learner());
        backend.seed(
            Collection::ContentSummaryLog,
            json!({
                "id": "s1",
                "user": "u1",
                "content_id": "c1",
                "start_timestamp": "2024-01-01T00:00:00Z",
                "progress": 0.5,
                "time_spent": 60.0,
                "currentmasterylog": {
                    "id": "m1",
                    "summarylog": "s1",
                    "start_timestamp": "2024-01-01T00:00:00Z",
                    "mastery_level": 2
                }
            }),
        );

        let started = coordinator.init_content_session(content()).await.unwrap();
        assert_eq!(
            started.summary,
            SummarySource::Existing(Some(SummaryLogId::new("s1")))
        );
        let logging = store.read(|s| s.logging.clone());
        assert_eq!(logging.summary.unwrap().progress_before_current_session, 0.5);
        assert_eq!(logging.mastery.unwrap().mastery_level, 2);
        assert_eq!(logging.session.unwrap().id, Some(started.session_id));
        assert_eq!(backend.count(Operation::Create, Collection::ContentSummaryLog), 0);
    }

    #[tokio::test]
    async fn superuser_session_has_no_owner() {
        let mut session = learner();
        session.kind = vec![UserKind::Superuser];
        let (store, backend, coordinator) = coordinator(session);

        let started = coordinator.init_content_session(content()).await.unwrap();
        assert_eq!(started.summary, SummarySource::Untracked);
        assert!(store.read(|s| s.logging.summary.is_none()));
        let sessions = backend.records(Collection::ContentSessionLog);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0]["user"].is_null());
        assert_eq!(backend.count(Operation::FetchCollection, Collection::ContentSummaryLog), 0);
    }

    #[tokio::test]
    async fn reinit_clears_previous_logs() {
        let (store, _backend, coordinator) = coordinator(learner());
        coordinator.init_content_session(content()).await.unwrap();
        store.update(|s| s.logging.attempt_ids.insert("q1".parse().unwrap(), "a1".parse().unwrap()));

        let other = ContentRef::new(ChannelId::new("ch"), ContentId::new("c2"), ContentKind::Video);
        coordinator.init_content_session(other.clone()).await.unwrap();
        let logging = store.read(|s| s.logging.clone());
        assert_eq!(logging.content, Some(other));
        assert!(logging.attempt_ids.is_empty());
        assert!(logging.mastery.is_none());
    }

    #[tokio::test]
    async fn session_create_failure_is_returned() {
        let (store, backend, coordinator) = coordinator(learner());
        backend.fail_next(Collection::ContentSessionLog, 503);

        let err = coordinator.init_content_session(content()).await.unwrap_err();
        assert!(matches!(err, LoggingError::Api(ref e) if e.status() == Some(503)));
        // The summary path still completed.
        assert!(store.read(|s| s.logging.summary.as_ref().is_some_and(SummaryLog::is_persisted)));
    }
}
