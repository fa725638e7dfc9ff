//! Progress and time tracking for the content being viewed.

mod flush;
mod timer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use progress_core::model::{COMPLETE_PROGRESS, SummaryLog, clamp_progress};
use progress_core::{Clock, ValidationError};
use resources::ResourceClient;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::LoggingError;
use crate::store::Store;

use self::flush::{FlushPlan, plan_flush, spawn_flush};

pub use flush::{FlushReport, PendingFlush};
pub use timer::IntervalTimer;

/// Result of a progress update.
#[derive(Debug)]
pub struct ProgressUpdate {
    pub session_progress: f64,
    /// Zero while the summary log has not been persisted.
    pub summary_progress: f64,
    /// The summary crossed full completion on this update.
    pub completed: bool,
    pub flush: Option<PendingFlush>,
}

/// Result of a time update.
#[derive(Debug)]
pub struct TimeUpdate {
    pub session_time: f64,
    /// Zero while the summary log has not been persisted.
    pub summary_time: f64,
    pub flush: Option<PendingFlush>,
}

struct RunningTimer {
    handle: JoinHandle<()>,
    interval: IntervalTimer,
}

/// Accumulates progress and time on the active logs and decides when to save.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Store,
    client: Arc<dyn ResourceClient>,
    clock: Clock,
    config: TrackerConfig,
    timer: Arc<Mutex<Option<RunningTimer>>>,
}

/// Slack for float drift when comparing unsaved gains to a threshold.
const THRESHOLD_EPSILON: f64 = 1e-9;

fn reaches_threshold(gained: f64, threshold: f64) -> bool {
    gained >= threshold - THRESHOLD_EPSILON
}

/// Stamp the first crossing of full progress.
fn record_completion(summary: &mut SummaryLog, was_complete: bool, now: DateTime<Utc>) -> bool {
    if was_complete || !summary.is_complete() {
        return false;
    }
    summary.completion_timestamp = Some(now);
    true
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        store: Store,
        client: Arc<dyn ResourceClient>,
        clock: Clock,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            client,
            clock,
            config,
            timer: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<RunningTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, plan: Option<FlushPlan>) -> Result<Option<PendingFlush>, LoggingError> {
        plan.map(|plan| spawn_flush(&self.client, plan)).transpose()
    }

    /// Add `delta` to session progress and derive summary progress.
    ///
    /// Local state always changes. A flush starts when `force_save` is set,
    /// the summary completes, or unsaved progress reaches the threshold.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoSessionLog` without an active session log,
    /// `LoggingError::Validation` for a non-finite delta and
    /// `LoggingError::NoRuntime` if a flush is due outside a tokio runtime.
    /// `LoggingError::Mapping` and `LoggingError::NoRuntime` are returned
    /// after local progress, completion and watermarks have already moved;
    /// nothing is rolled back.
    pub fn update_progress(
        &self,
        delta: f64,
        force_save: bool,
    ) -> Result<ProgressUpdate, LoggingError> {
        if !delta.is_finite() {
            return Err(ValidationError::NonFiniteProgress(delta).into());
        }
        let now = self.clock.now();
        let threshold = self.config.progress_threshold;

        let (session_progress, summary_progress, completed, plan) =
            self.store.update(|state| -> Result<_, LoggingError> {
                let logging = &mut state.logging;
                let session = logging.session.as_mut().ok_or(LoggingError::NoSessionLog)?;
                let session_progress = clamp_progress(session.progress + delta);
                session.progress = session_progress;
                let threshold_met =
                    reaches_threshold(session_progress - session.progress_at_last_save, threshold);

                let (summary_progress, completed) = match logging.summary.as_mut() {
                    Some(summary) if summary.is_persisted() => {
                        let was_complete = summary.is_complete();
                        let progress = clamp_progress(
                            summary.progress_before_current_session + session_progress,
                        )
                        .max(summary.progress);
                        summary.progress = progress;
                        (progress, record_completion(summary, was_complete, now))
                    }
                    _ => (0.0, false),
                };

                let plan = if force_save || completed || threshold_met {
                    Some(plan_flush(logging)?)
                } else {
                    None
                };
                Ok((session_progress, summary_progress, completed, plan))
            })?;

        debug!(session_progress, summary_progress, completed, "progress updated");
        if completed {
            info!("content completed");
        }
        Ok(ProgressUpdate {
            session_progress,
            summary_progress,
            completed,
            flush: self.dispatch(plan)?,
        })
    }

    /// Set exercise progress to an absolute value.
    ///
    /// Summary progress never moves backwards. A flush starts only when
    /// `force_save` is set or progress first reaches full completion.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressTracker::update_progress`].
    pub fn update_exercise_progress(
        &self,
        progress: f64,
        force_save: bool,
    ) -> Result<ProgressUpdate, LoggingError> {
        if !progress.is_finite() {
            return Err(ValidationError::NonFiniteProgress(progress).into());
        }
        let now = self.clock.now();
        let value = clamp_progress(progress);

        let (summary_progress, completed, plan) =
            self.store.update(|state| -> Result<_, LoggingError> {
                let logging = &mut state.logging;
                let session = logging.session.as_mut().ok_or(LoggingError::NoSessionLog)?;
                let reached_full =
                    value >= COMPLETE_PROGRESS && session.progress < COMPLETE_PROGRESS;
                session.progress = value;

                let (summary_progress, completed) = match logging.summary.as_mut() {
                    Some(summary) => {
                        let was_complete = summary.is_complete();
                        summary.progress = summary.progress.max(value);
                        (
                            summary.progress,
                            record_completion(summary, was_complete, now),
                        )
                    }
                    None => (0.0, false),
                };

                let plan = if force_save || completed || reached_full {
                    Some(plan_flush(logging)?)
                } else {
                    None
                };
                Ok((summary_progress, completed, plan))
            })?;

        debug!(session_progress = value, summary_progress, "exercise progress updated");
        Ok(ProgressUpdate {
            session_progress: value,
            summary_progress,
            completed,
            flush: self.dispatch(plan)?,
        })
    }

    /// Add `elapsed_secs` to session time and derive summary time.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoSessionLog` without an active session log,
    /// `LoggingError::Validation` for negative or non-finite input and
    /// `LoggingError::NoRuntime` if a flush is due outside a tokio runtime.
    /// As with progress, a flush error leaves the local time update in place.
    pub fn update_time_spent(
        &self,
        elapsed_secs: f64,
        force_save: bool,
    ) -> Result<TimeUpdate, LoggingError> {
        if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            return Err(ValidationError::InvalidElapsed(elapsed_secs).into());
        }
        let now = self.clock.now();
        let threshold = self.config.time_threshold_secs;

        let (session_time, summary_time, plan) =
            self.store.update(|state| -> Result<_, LoggingError> {
                let logging = &mut state.logging;
                let session = logging.session.as_mut().ok_or(LoggingError::NoSessionLog)?;
                session.time_spent += elapsed_secs;
                session.end_timestamp = now;
                let session_time = session.time_spent;
                let threshold_met =
                    reaches_threshold(session_time - session.total_time_at_last_save, threshold);

                let summary_time = match logging.summary.as_mut() {
                    Some(summary) if summary.is_persisted() => {
                        summary.time_spent =
                            summary.time_spent_before_current_session + session_time;
                        summary.end_timestamp = now;
                        summary.time_spent
                    }
                    _ => 0.0,
                };

                let plan = if force_save || threshold_met {
                    Some(plan_flush(logging)?)
                } else {
                    None
                };
                Ok((session_time, summary_time, plan))
            })?;

        Ok(TimeUpdate {
            session_time,
            summary_time,
            flush: self.dispatch(plan)?,
        })
    }

    /// Save both content logs now with whatever state they hold.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NoRuntime` outside a tokio runtime.
    pub fn save_logs(&self) -> Result<PendingFlush, LoggingError> {
        let plan = self
            .store
            .update(|state| plan_flush(&mut state.logging))?;
        spawn_flush(&self.client, plan)
    }

    /// Start the periodic timer that feeds elapsed time into the session.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::AlreadyTracking` if a timer is running and
    /// `LoggingError::NoRuntime` outside a tokio runtime.
    pub fn start_tracking(&self) -> Result<(), LoggingError> {
        let runtime = Handle::try_current().map_err(|_| LoggingError::NoRuntime)?;
        let mut timer = self.lock_timer();
        if timer.is_some() {
            return Err(LoggingError::AlreadyTracking);
        }

        let interval = IntervalTimer::start();
        let ticks = interval.clone();
        let tracker = self.clone();
        let period = self.config.tick_interval;
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let elapsed = ticks.take_elapsed().as_secs_f64();
                if let Err(err) = tracker.update_time_spent(elapsed, false) {
                    warn!(error = %err, "time tracking tick failed");
                }
            }
        });

        *timer = Some(RunningTimer { handle, interval });
        info!(interval_secs = period.as_secs_f64(), "started time tracking");
        Ok(())
    }

    /// Stop the timer, record the remaining time and force a save.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::NotTracking` if no timer is running, plus any
    /// error from the final time update.
    pub fn stop_tracking(&self) -> Result<TimeUpdate, LoggingError> {
        let running = self.lock_timer().take().ok_or(LoggingError::NotTracking)?;
        running.handle.abort();
        let elapsed = running.interval.take_elapsed().as_secs_f64();
        info!("stopped time tracking");
        self.update_time_spent(elapsed, true)
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.lock_timer().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{
        ChannelId, ContentId, ContentKind, ContentRef, SessionLog, SessionLogId, SummaryLogId,
    };
    use progress_core::time::{fixed_clock, fixed_now};
    use resources::{Collection, InMemoryResources, Operation};
    use serde_json::json;
    use std::time::Duration;

    use crate::store::LoggingState;

    struct Fixture {
        store: Store,
        backend: InMemoryResources,
        tracker: ProgressTracker,
    }

    fn fixture(config: TrackerConfig) -> Fixture {
        let store = Store::new();
        let backend = InMemoryResources::new();
        let tracker = ProgressTracker::new(
            store.clone(),
            Arc::new(backend.clone()),
            fixed_clock(),
            config,
        );
        Fixture {
            store,
            backend,
            tracker,
        }
    }

    /// Seed persisted summary/session logs with the given prior summary state.
    fn with_logs(fx: &Fixture, before_progress: f64, before_time: f64) {
        let summary_id = fx.backend.seed(
            Collection::ContentSummaryLog,
            json!({"start_timestamp": "2024-01-01T00:00:00Z"}),
        );
        let session_id = fx.backend.seed(
            Collection::ContentSessionLog,
            json!({"start_timestamp": "2024-01-01T00:00:00Z"}),
        );
        let mut summary = SummaryLog::fresh(fixed_now());
        summary.id = Some(SummaryLogId::new(summary_id));
        summary.progress = before_progress;
        summary.progress_before_current_session = before_progress;
        summary.time_spent = before_time;
        summary.time_spent_before_current_session = before_time;
        let mut session = SessionLog::fresh(fixed_now());
        session.id = Some(SessionLogId::new(session_id));

        fx.store.update(|state| {
            state.logging = LoggingState {
                content: Some(ContentRef::new(
                    ChannelId::new("ch"),
                    ContentId::new("c1"),
                    ContentKind::Video,
                )),
                summary: Some(summary),
                session: Some(session),
                ..LoggingState::default()
            };
        });
    }

    #[tokio::test]
    async fn progress_without_session_log_fails() {
        let fx = fixture(TrackerConfig::default());
        let err = fx.tracker.update_progress(0.2, false).unwrap_err();
        assert!(matches!(err, LoggingError::NoSessionLog));
    }

    #[tokio::test]
    async fn small_increments_accumulate_until_threshold() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 0.0);

        let first = fx.tracker.update_progress(0.05, false).unwrap();
        assert!(first.flush.is_none());
        let second = fx.tracker.update_progress(0.05, false).unwrap();
        let report = second.flush.unwrap().wait().await.unwrap();
        assert!(report.is_ok());
        assert_eq!(fx.backend.count(Operation::Save, Collection::ContentSessionLog), 1);

        let session = fx.store.read(|s| s.logging.session.clone().unwrap());
        assert_eq!(session.progress_at_last_save, session.progress);
    }

    #[tokio::test]
    async fn summary_progress_adds_prior_progress_and_caps() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.7, 0.0);

        let update = fx.tracker.update_progress(0.5, false).unwrap();
        assert_eq!(update.session_progress, 0.5);
        assert_eq!(update.summary_progress, 1.0);
        assert!(update.completed);
        update.flush.unwrap().wait().await.unwrap();

        let summary = fx.store.read(|s| s.logging.summary.clone().unwrap());
        assert_eq!(summary.completion_timestamp, Some(fixed_now()));

        let later = ProgressTracker::new(
            fx.store.clone(),
            Arc::new(fx.backend.clone()),
            Clock::fixed(fixed_now() + chrono::Duration::hours(1)),
            TrackerConfig::default(),
        );
        let again = later.update_progress(0.01, false).unwrap();
        assert!(!again.completed);
        assert!(again.flush.is_none());
        let summary = fx.store.read(|s| s.logging.summary.clone().unwrap());
        assert_eq!(summary.completion_timestamp, Some(fixed_now()));
    }

    #[tokio::test]
    async fn threshold_counts_from_last_save_without_float_drift() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 0.0);

        fx.tracker
            .update_progress(0.7, false)
            .unwrap()
            .flush
            .unwrap()
            .wait()
            .await
            .unwrap();
        let update = fx.tracker.update_progress(0.1, false).unwrap();
        assert!(update.flush.is_some());

        let saved = fx.tracker.update_time_spent(10.7, true).unwrap();
        saved.flush.unwrap().wait().await.unwrap();
        let time = fx.tracker.update_time_spent(30.0, false).unwrap();
        assert!(time.flush.is_some());
    }

    #[tokio::test]
    async fn unsynced_summary_reports_zero() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 0.0);
        fx.store
            .update(|s| s.logging.summary.as_mut().unwrap().id = None);

        let update = fx.tracker.update_progress(0.3, false).unwrap();
        assert_eq!(update.summary_progress, 0.0);
        let report = update.flush.unwrap().wait().await.unwrap();
        assert!(report.summary.is_none());
        assert!(report.session.is_some());
    }

    #[tokio::test]
    async fn exercise_progress_is_absolute_and_monotonic() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.6, 0.0);

        let update = fx.tracker.update_exercise_progress(0.4, false).unwrap();
        assert_eq!(update.session_progress, 0.4);
        assert_eq!(update.summary_progress, 0.6);
        assert!(update.flush.is_none());

        let done = fx.tracker.update_exercise_progress(1.0, false).unwrap();
        assert!(done.completed);
        done.flush.unwrap().wait().await.unwrap();
        let saved = fx.backend.records(Collection::ContentSummaryLog);
        assert_eq!(saved[0]["progress"], json!(1.0));
    }

    #[tokio::test]
    async fn time_threshold_triggers_flush() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 100.0);

        let first = fx.tracker.update_time_spent(20.0, false).unwrap();
        assert_eq!(first.session_time, 20.0);
        assert_eq!(first.summary_time, 120.0);
        assert!(first.flush.is_none());

        let second = fx.tracker.update_time_spent(10.0, false).unwrap();
        second.flush.unwrap().wait().await.unwrap();
        let saved = fx.backend.records(Collection::ContentSummaryLog);
        assert_eq!(saved[0]["time_spent"], json!(130.0));
    }

    #[tokio::test]
    async fn invalid_input_leaves_state_untouched() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 0.0);
        let before = fx.store.snapshot();

        assert!(fx.tracker.update_progress(f64::NAN, false).is_err());
        assert!(fx.tracker.update_time_spent(-1.0, false).is_err());
        assert_eq!(fx.store.snapshot(), before);
    }

    #[tokio::test]
    async fn failed_save_is_reported_not_raised() {
        let fx = fixture(TrackerConfig::default());
        with_logs(&fx, 0.0, 0.0);
        fx.backend.fail_next(Collection::ContentSummaryLog, 500);

        let update = fx.tracker.update_progress(0.0, true).unwrap();
        let report = update.flush.unwrap().wait().await.unwrap();
        assert!(!report.is_ok());
        assert!(matches!(report.session, Some(Ok(()))));
    }

    #[test]
    fn flush_outside_runtime_is_an_error() {
        let fx = fixture(TrackerConfig::default());
        fx.store.update(|s| {
            s.logging.session = Some(SessionLog::fresh(fixed_now()));
        });
        let err = fx.tracker.update_progress(0.5, false).unwrap_err();
        assert!(matches!(err, LoggingError::NoRuntime));

        let session = fx.store.read(|s| s.logging.session.clone().unwrap());
        assert_eq!(session.progress, 0.5);
        assert_eq!(session.progress_at_last_save, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_feeds_elapsed_time() {
        let fx = fixture(TrackerConfig {
            tick_interval: Duration::from_secs(5),
            ..TrackerConfig::default()
        });
        with_logs(&fx, 0.0, 0.0);

        fx.tracker.start_tracking().unwrap();
        assert!(matches!(
            fx.tracker.start_tracking(),
            Err(LoggingError::AlreadyTracking)
        ));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let ticked = fx.store.read(|s| s.logging.session.clone().unwrap().time_spent);
        assert_eq!(ticked, 10.0);

        let stopped = fx.tracker.stop_tracking().unwrap();
        assert_eq!(stopped.session_time, 11.0);
        stopped.flush.unwrap().wait().await.unwrap();
        assert!(!fx.tracker.is_tracking());
        assert!(matches!(
            fx.tracker.stop_tracking(),
            Err(LoggingError::NotTracking)
        ));
    }
}
