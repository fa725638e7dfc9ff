//! Mastery and attempt log lifecycle for assessment content.
//!
//! Every write captures the page token before it starts; results that land
//! after the learner moved to another page are dropped.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use progress_core::mapping::{
    ATTEMPT_LOG, AttemptLogRecord, MASTERY_LOG, MasteryLogRecord, attempt_to_record,
    mastery_from_record, mastery_to_record,
};
use progress_core::model::{AttemptLog, Interaction, ItemId, MasteryCriterion, MasteryLog};
use progress_core::Clock;
use resources::{Collection, ResourceClient};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::LoggingError;
use crate::store::Store;

/// What `init_mastery_log` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasteryInit {
    Created { level: u32 },
    Continued,
}

/// How a remote write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The page changed while the request was in flight.
    Stale,
    /// The log never leaves this process.
    LocalOnly,
}

/// Answer state reported by an assessment renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptUpdate {
    pub current_time: DateTime<Utc>,
    pub correct: f64,
    pub complete: bool,
    pub first_attempt: bool,
    pub hinted: bool,
    pub answer: Option<Value>,
    pub simple_answer: String,
}

#[derive(Clone)]
pub struct MasteryManager {
    store: Store,
    client: Arc<dyn ResourceClient>,
    clock: Clock,
}

impl MasteryManager {
    #[must_use]
    pub fn new(store: Store, client: Arc<dyn ResourceClient>, clock: Clock) -> Self {
        Self {
            store,
            client,
            clock,
        }
    }

    /// Create, level up or continue the mastery log for the active content.
    ///
    /// A log is created at the initial level when none is persisted, and at
    /// the next level when the current one is complete and `spacing` has
    /// passed since completion. Otherwise the current log is kept.
    pub fn init_mastery_log(
        &self,
        spacing: Duration,
        criterion: MasteryCriterion,
    ) -> impl Future<Output = Result<MasteryInit, LoggingError>> + Send + 'static {
        let now = self.clock.now();
        let next_level = self.store.read(|state| match &state.logging.mastery {
            Some(mastery) if mastery.id.is_some() => mastery
                .cooldown_elapsed(now, spacing)
                .then(|| mastery.mastery_level.saturating_add(1)),
            _ => Some(MasteryLog::INITIAL_LEVEL),
        });
        let pending = next_level.map(|level| (level, self.create_mastery_log(level, criterion)));

        async move {
            match pending {
                Some((level, create)) => {
                    create.await?;
                    Ok(MasteryInit::Created { level })
                }
                None => Ok(MasteryInit::Continued),
            }
        }
    }

    /// Install a new mastery log locally, then create it remotely.
    ///
    /// # Errors
    ///
    /// The future fails with `LoggingError::NoSessionLog` without an active
    /// session log and `LoggingError::NotPersisted` if the summary log has no id.
    pub fn create_mastery_log(
        &self,
        level: u32,
        criterion: MasteryCriterion,
    ) -> impl Future<Output = Result<WriteOutcome, LoggingError>> + Send + 'static {
        let token = self.store.epoch().token();
        let now = self.clock.now();
        let prepared = self.store.update(|state| -> Result<Value, LoggingError> {
            let logging = &mut state.logging;
            if logging.session.is_none() {
                return Err(LoggingError::NoSessionLog);
            }
            let summary_id = logging
                .summary
                .as_ref()
                .and_then(|summary| summary.id.clone())
                .ok_or(LoggingError::NotPersisted("summary log"))?;
            let mastery = MasteryLog::new(summary_id, level, criterion, now);
            let payload = MASTERY_LOG.encode(&mastery_to_record(&mastery))?;
            logging.mastery = Some(mastery);
            Ok(payload)
        });
        let store = self.store.clone();
        let client = Arc::clone(&self.client);

        async move {
            let payload = prepared?;
            let created = client.create(Collection::MasteryLog, payload).await?;
            let record: MasteryLogRecord = MASTERY_LOG.decode(created)?;
            if !store.epoch().is_current(token) {
                debug!(mastery_level = level, "dropping stale mastery log create");
                return Ok(WriteOutcome::Stale);
            }
            store.update(|state| {
                if let Some(mastery) = state.logging.mastery.as_mut() {
                    mastery.id = record.id;
                }
            });
            info!(mastery_level = level, "created mastery log");
            Ok(WriteOutcome::Applied)
        }
    }

    /// Install a mastery log that is never sent to the server.
    pub fn create_dummy_mastery_log(&self) {
        let now = self.clock.now();
        self.store
            .update(|state| state.logging.mastery = Some(MasteryLog::dummy(now)));
    }

    /// Save the active mastery log and adopt the server's copy.
    ///
    /// # Errors
    ///
    /// The future fails with `LoggingError::NoMasteryLog` without a mastery
    /// log and `LoggingError::NotPersisted` if it was never created remotely.
    pub fn save_mastery_log(
        &self,
    ) -> impl Future<Output = Result<WriteOutcome, LoggingError>> + Send + 'static {
        let token = self.store.epoch().token();
        let prepared = self.store.read(|state| -> Result<_, LoggingError> {
            let mastery = state
                .logging
                .mastery
                .as_ref()
                .ok_or(LoggingError::NoMasteryLog)?;
            if mastery.is_local_only() {
                return Ok(None);
            }
            let id = mastery
                .id
                .clone()
                .ok_or(LoggingError::NotPersisted("mastery log"))?;
            Ok(Some((id, MASTERY_LOG.encode(&mastery_to_record(mastery))?)))
        });
        let store = self.store.clone();
        let client = Arc::clone(&self.client);

        async move {
            let Some((id, payload)) = prepared? else {
                return Ok(WriteOutcome::LocalOnly);
            };
            let saved = client
                .save(Collection::MasteryLog, id.as_str(), payload)
                .await?;
            let record: MasteryLogRecord = MASTERY_LOG.decode(saved)?;
            if !store.epoch().is_current(token) {
                debug!(%id, "dropping stale mastery log save");
                return Ok(WriteOutcome::Stale);
            }
            store.update(|state| state.logging.mastery = Some(mastery_from_record(&record)));
            Ok(WriteOutcome::Applied)
        }
    }

    /// Mark the active mastery log complete at `at`.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoMasteryLog` without a mastery log.
    pub fn set_mastery_log_complete(&self, at: DateTime<Utc>) -> Result<(), LoggingError> {
        self.store.update(|state| {
            let mastery = state
                .logging
                .mastery
                .as_mut()
                .ok_or(LoggingError::NoMasteryLog)?;
            mastery.mark_complete(at);
            Ok(())
        })
    }

    /// Start a fresh local attempt on `item`.
    ///
    /// Reuses the remote id when the item was already attempted on this page.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoSessionLog` or `LoggingError::NoMasteryLog`
    /// if either is missing, and `LoggingError::NotPersisted` while a remote
    /// mastery log is still waiting for its id.
    pub fn create_attempt_log(&self, item: ItemId) -> Result<(), LoggingError> {
        let now = self.clock.now();
        self.store.update(|state| {
            let logging = &mut state.logging;
            let session = logging.session.as_ref().ok_or(LoggingError::NoSessionLog)?;
            let mastery = logging.mastery.as_ref().ok_or(LoggingError::NoMasteryLog)?;
            if !mastery.is_local_only() && mastery.id.is_none() {
                return Err(LoggingError::NotPersisted("mastery log"));
            }
            let mut attempt = AttemptLog::new(
                item.clone(),
                mastery.id.clone(),
                session.id.clone(),
                now,
            );
            attempt.id = logging.attempt_ids.get(&item).cloned();
            logging.attempt = Some(attempt);
            Ok(())
        })
    }

    /// Create or update the active attempt remotely.
    ///
    /// Attempts under a local-only mastery log are not sent.
    ///
    /// # Errors
    ///
    /// The future fails with `LoggingError::NoAttemptLog` without an attempt.
    pub fn save_attempt_log(
        &self,
    ) -> impl Future<Output = Result<WriteOutcome, LoggingError>> + Send + 'static {
        let token = self.store.epoch().token();
        let prepared = self.store.read(|state| -> Result<_, LoggingError> {
            let logging = &state.logging;
            let attempt = logging.attempt.as_ref().ok_or(LoggingError::NoAttemptLog)?;
            if logging.mastery.as_ref().is_some_and(MasteryLog::is_local_only) {
                return Ok(None);
            }
            let id = attempt
                .id
                .clone()
                .or_else(|| logging.attempt_ids.get(&attempt.item).cloned());
            let payload = ATTEMPT_LOG.encode(&attempt_to_record(attempt))?;
            Ok(Some((attempt.item.clone(), id, payload)))
        });
        let store = self.store.clone();
        let client = Arc::clone(&self.client);

        async move {
            let Some((item, id, payload)) = prepared? else {
                return Ok(WriteOutcome::LocalOnly);
            };
            let response = match &id {
                Some(id) => {
                    client
                        .save(Collection::AttemptLog, id.as_str(), payload)
                        .await?
                }
                None => client.create(Collection::AttemptLog, payload).await?,
            };
            let record: AttemptLogRecord = ATTEMPT_LOG.decode(response)?;
            if !store.epoch().is_current(token) {
                debug!(%item, "dropping stale attempt log write");
                return Ok(WriteOutcome::Stale);
            }
            if let Some(saved_id) = record.id {
                store.update(|state| {
                    let logging = &mut state.logging;
                    logging.attempt_ids.insert(item.clone(), saved_id.clone());
                    if let Some(attempt) = logging.attempt.as_mut().filter(|a| a.item == item) {
                        attempt.id = Some(saved_id);
                    }
                });
            }
            Ok(WriteOutcome::Applied)
        }
    }

    /// Append an interaction built from raw renderer fields.
    ///
    /// Fields are validated before anything changes.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::Validation` for disallowed or malformed fields
    /// and `LoggingError::NoAttemptLog` without an attempt.
    pub fn update_attempt_interaction_history(
        &self,
        fields: &Map<String, Value>,
    ) -> Result<(), LoggingError> {
        let now = self.clock.now();
        let interaction = Interaction::from_fields(fields, now)?;
        self.store.update(|state| {
            let logging = &mut state.logging;
            let attempt = logging.attempt.as_mut().ok_or(LoggingError::NoAttemptLog)?;
            attempt.interaction_history.push(interaction);
            if let Some(mastery) = logging.mastery.as_mut() {
                mastery.end_timestamp = Some(now);
            }
            Ok(())
        })
    }

    /// Fold an answer into the active attempt and mastery logs.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoMasteryLog` or `LoggingError::NoAttemptLog`
    /// if either is missing; nothing changes in that case.
    pub fn update_mastery_attempt_state(&self, update: AttemptUpdate) -> Result<(), LoggingError> {
        let at = update.current_time;
        self.store.update(|state| {
            let logging = &mut state.logging;
            let mastery = logging.mastery.as_mut().ok_or(LoggingError::NoMasteryLog)?;
            let attempt = logging.attempt.as_mut().ok_or(LoggingError::NoAttemptLog)?;

            if update.first_attempt {
                mastery.record_first_attempt(update.correct >= 1.0, at);
                attempt.correct = update.correct;
            } else {
                mastery.end_timestamp = Some(at);
            }
            attempt.touch(at);
            if update.complete {
                attempt.complete = true;
                attempt.completion_timestamp = Some(at);
                attempt.correct = update.correct;
            }
            attempt.answer = update.answer;
            attempt.simple_answer = update.simple_answer;
            attempt.hinted |= update.hinted;
            Ok(())
        })
    }

    /// Whether the active mastery log's response history meets its criterion.
    ///
    /// `item_count` is the number of items in the exercise. A log without a
    /// criterion is never met.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoMasteryLog` without a mastery log.
    pub fn mastery_criterion_met(&self, item_count: usize) -> Result<bool, LoggingError> {
        self.store.read(|state| {
            let mastery = state
                .logging
                .mastery
                .as_ref()
                .ok_or(LoggingError::NoMasteryLog)?;
            Ok(mastery
                .mastery_criterion
                .is_some_and(|criterion| criterion.is_met(&mastery.response_history, item_count)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{SessionLog, SessionLogId, SummaryLog, SummaryLogId};
    use progress_core::time::{fixed_clock, fixed_now};
    use progress_core::ValidationError;
    use resources::{InMemoryResources, Operation};
    use serde_json::json;

    fn manager() -> (Store, InMemoryResources, MasteryManager) {
        let store = Store::new();
        let backend = InMemoryResources::new();
        let manager = MasteryManager::new(store.clone(), Arc::new(backend.clone()), fixed_clock());
        (store, backend, manager)
    }

    fn with_content_logs(store: &Store) {
        store.update(|state| {
            let mut summary = SummaryLog::fresh(fixed_now());
            summary.id = Some(SummaryLogId::new("s1"));
            let mut session = SessionLog::fresh(fixed_now());
            session.id = Some(SessionLogId::new("se1"));
            state.logging.summary = Some(summary);
            state.logging.session = Some(session);
        });
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn init_creates_initial_level() {
        let (store, backend, manager) = manager();
        with_content_logs(&store);

        let init = manager
            .init_mastery_log(Duration::minutes(5), MasteryCriterion::DoAll)
            .await
            .unwrap();
        assert_eq!(init, MasteryInit::Created { level: 1 });
        let mastery = store.read(|s| s.logging.mastery.clone().unwrap());
        assert!(mastery.id.is_some());
        assert_eq!(mastery.summary_log, Some(SummaryLogId::new("s1")));
        assert_eq!(backend.count(Operation::Create, Collection::MasteryLog), 1);
    }

    #[tokio::test]
    async fn init_continues_incomplete_log() {
        let (store, backend, manager) = manager();
        with_content_logs(&store);
        manager
            .init_mastery_log(Duration::minutes(5), MasteryCriterion::DoAll)
            .await
            .unwrap();

        let init = manager
            .init_mastery_log(Duration::minutes(5), MasteryCriterion::DoAll)
            .await
            .unwrap();
        assert_eq!(init, MasteryInit::Continued);
        assert_eq!(backend.count(Operation::Create, Collection::MasteryLog), 1);
    }

    #[tokio::test]
    async fn create_without_persisted_summary_fails_before_request() {
        let (store, backend, manager) = manager();
        with_content_logs(&store);
        store.update(|s| s.logging.summary.as_mut().unwrap().id = None);

        let err = manager
            .create_mastery_log(1, MasteryCriterion::DoAll)
            .await
            .unwrap_err();
        assert!(matches!(err, LoggingError::NotPersisted("summary log")));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn save_resolving_on_a_new_page_leaves_local_state() {
        let (store, _backend, manager) = manager();
        with_content_logs(&store);
        manager
            .create_mastery_log(1, MasteryCriterion::DoAll)
            .await
            .unwrap();

        let pending = manager.save_mastery_log();
        store.epoch().advance();
        store.update(|s| s.logging.mastery.as_mut().unwrap().total_attempts = 9);

        assert_eq!(pending.await.unwrap(), WriteOutcome::Stale);
        assert_eq!(
            store.read(|s| s.logging.mastery.as_ref().unwrap().total_attempts),
            9
        );
    }

    #[tokio::test]
    async fn dummy_mastery_never_hits_the_server() {
        let (store, backend, manager) = manager();
        with_content_logs(&store);
        manager.create_dummy_mastery_log();
        manager.create_attempt_log(ItemId::new("q1")).unwrap();

        assert_eq!(
            manager.save_mastery_log().await.unwrap(),
            WriteOutcome::LocalOnly
        );
        assert_eq!(
            manager.save_attempt_log().await.unwrap(),
            WriteOutcome::LocalOnly
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn attempt_save_creates_then_updates() {
        let (store, backend, manager) = manager();
        with_content_logs(&store);
        manager
            .create_mastery_log(1, MasteryCriterion::MOfN { m: 3, n: 5 })
            .await
            .unwrap();

        manager.create_attempt_log(ItemId::new("q1")).unwrap();
        assert_eq!(manager.save_attempt_log().await.unwrap(), WriteOutcome::Applied);
        manager.create_attempt_log(ItemId::new("q1")).unwrap();
        let attempt = store.read(|s| s.logging.attempt.clone().unwrap());
        assert!(attempt.id.is_some());
        manager.save_attempt_log().await.unwrap();

        assert_eq!(backend.count(Operation::Create, Collection::AttemptLog), 1);
        assert_eq!(backend.count(Operation::Save, Collection::AttemptLog), 1);
    }

    #[tokio::test]
    async fn attempt_requires_session_and_mastery() {
        let (store, _backend, manager) = manager();
        assert!(matches!(
            manager.create_attempt_log(ItemId::new("q1")),
            Err(LoggingError::NoSessionLog)
        ));
        with_content_logs(&store);
        assert!(matches!(
            manager.create_attempt_log(ItemId::new("q1")),
            Err(LoggingError::NoMasteryLog)
        ));
    }

    #[tokio::test]
    async fn disallowed_interaction_field_is_rejected_without_mutation() {
        let (store, _backend, manager) = manager();
        with_content_logs(&store);
        manager.create_dummy_mastery_log();
        manager.create_attempt_log(ItemId::new("q1")).unwrap();
        let before = store.snapshot();

        let err = manager
            .update_attempt_interaction_history(&fields(json!({"type": "answer", "score": 1})))
            .unwrap_err();
        assert!(matches!(
            err,
            LoggingError::Validation(ValidationError::DisallowedField(ref f)) if f == "score"
        ));
        assert_eq!(store.snapshot(), before);

        manager
            .update_attempt_interaction_history(&fields(json!({"type": "hint"})))
            .unwrap();
        let state = store.snapshot();
        assert_eq!(state.logging.attempt.unwrap().interaction_history.len(), 1);
        assert_eq!(state.logging.mastery.unwrap().end_timestamp, Some(fixed_now()));
    }

    #[tokio::test]
    async fn attempt_state_updates_history_on_first_attempt() {
        let (store, _backend, manager) = manager();
        with_content_logs(&store);
        manager.create_dummy_mastery_log();
        manager.create_attempt_log(ItemId::new("q1")).unwrap();
        let later = fixed_now() + Duration::seconds(40);

        manager
            .update_mastery_attempt_state(AttemptUpdate {
                current_time: later,
                correct: 1.0,
                complete: true,
                first_attempt: true,
                hinted: false,
                answer: Some(json!({"choice": 2})),
                simple_answer: "2".into(),
            })
            .unwrap();

        let state = store.snapshot();
        let mastery = state.logging.mastery.unwrap();
        let attempt = state.logging.attempt.unwrap();
        assert_eq!(mastery.response_history, vec![true]);
        assert_eq!(mastery.total_attempts, 1);
        assert!(attempt.complete);
        assert_eq!(attempt.time_spent, 40.0);
        assert_eq!(attempt.completion_timestamp, Some(later));

        manager.set_mastery_log_complete(later).unwrap();
        assert!(store.read(|s| s.logging.mastery.as_ref().unwrap().complete));
    }

    #[tokio::test]
    async fn criterion_is_checked_against_response_history() {
        let (store, _backend, manager) = manager();
        assert!(matches!(
            manager.mastery_criterion_met(3),
            Err(LoggingError::NoMasteryLog)
        ));

        manager.create_dummy_mastery_log();
        store.update(|s| {
            s.logging.mastery.as_mut().unwrap().response_history = vec![false, true, true];
        });
        assert!(!manager.mastery_criterion_met(3).unwrap());

        store.update(|s| {
            s.logging.mastery.as_mut().unwrap().mastery_criterion =
                Some(MasteryCriterion::NumCorrectInARow { n: 2 });
        });
        assert!(manager.mastery_criterion_met(3).unwrap());
        store.update(|s| {
            s.logging.mastery.as_mut().unwrap().mastery_criterion = Some(MasteryCriterion::DoAll);
        });
        assert!(!manager.mastery_criterion_met(3).unwrap());
        assert!(manager.mastery_criterion_met(2).unwrap());
    }
}
