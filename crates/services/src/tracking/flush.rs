use std::sync::Arc;

use progress_core::mapping::{SESSION_LOG, SUMMARY_LOG, session_to_record, summary_to_record};
use progress_core::model::{SessionLogId, SummaryLogId};
use progress_core::MappingError;
use resources::{Collection, ResourceClient, ResourceError};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::LoggingError;
use crate::store::LoggingState;

/// Outcome of one background flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// `None` when the summary log had no id to save against.
    pub summary: Option<Result<(), ResourceError>>,
    pub session: Option<Result<(), ResourceError>>,
}

impl FlushReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        [&self.summary, &self.session]
            .into_iter()
            .flatten()
            .all(Result::is_ok)
    }

    #[must_use]
    pub fn saved_anything(&self) -> bool {
        self.summary.is_some() || self.session.is_some()
    }
}

/// Handle to a flush running in the background.
///
/// Dropping it leaves the flush running.
#[derive(Debug)]
pub struct PendingFlush {
    handle: JoinHandle<FlushReport>,
}

impl PendingFlush {
    /// Wait for both saves to settle.
    ///
    /// # Errors
    ///
    /// Returns `LoggingError::FlushTask` if the flush task panicked or was cancelled.
    pub async fn wait(self) -> Result<FlushReport, LoggingError> {
        self.handle
            .await
            .map_err(|err| LoggingError::FlushTask(err.to_string()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct FlushPlan {
    summary: Option<(SummaryLogId, Value)>,
    session: Option<(SessionLogId, Value)>,
}

/// Snapshot the logs that have ids and move the save watermarks.
///
/// Watermarks move before the requests go out, so the next threshold check
/// measures from what this flush is sending.
pub(crate) fn plan_flush(logging: &mut LoggingState) -> Result<FlushPlan, MappingError> {
    if let Some(session) = logging.session.as_mut() {
        session.mark_saved();
    }
    let Some(content) = logging.content.as_ref() else {
        return Ok(FlushPlan::default());
    };
    let user = logging.user.as_ref();

    let summary = match logging.summary.as_ref() {
        Some(summary) => match summary.id.clone() {
            Some(id) => Some((
                id,
                SUMMARY_LOG.encode(&summary_to_record(summary, content, user))?,
            )),
            None => None,
        },
        None => None,
    };
    let session = match logging.session.as_ref() {
        Some(session) => match session.id.clone() {
            Some(id) => Some((
                id,
                SESSION_LOG.encode(&session_to_record(session, content, user))?,
            )),
            None => None,
        },
        None => None,
    };
    Ok(FlushPlan { summary, session })
}

/// Start both saves without waiting for them.
pub(crate) fn spawn_flush(
    client: &Arc<dyn ResourceClient>,
    plan: FlushPlan,
) -> Result<PendingFlush, LoggingError> {
    let runtime = Handle::try_current().map_err(|_| LoggingError::NoRuntime)?;
    let client = Arc::clone(client);
    let handle = runtime.spawn(run_flush(client, plan));
    Ok(PendingFlush { handle })
}

async fn run_flush(client: Arc<dyn ResourceClient>, plan: FlushPlan) -> FlushReport {
    let FlushPlan { summary, session } = plan;
    let client = client.as_ref();
    let summary = async move {
        let (id, payload) = summary?;
        Some(
            client
                .save(Collection::ContentSummaryLog, id.as_str(), payload)
                .await
                .map(|_| ()),
        )
    };
    let session = async move {
        let (id, payload) = session?;
        Some(
            client
                .save(Collection::ContentSessionLog, id.as_str(), payload)
                .await
                .map(|_| ()),
        )
    };
    let (summary, session) = tokio::join!(summary, session);
    let report = FlushReport { summary, session };

    for (what, result) in [("summary", &report.summary), ("session", &report.session)] {
        match result {
            Some(Ok(())) => debug!(log = what, "saved content log"),
            Some(Err(err)) => warn!(log = what, error = %err, "failed to save content log"),
            None => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{
        ChannelId, ContentId, ContentKind, ContentRef, SessionLog, SummaryLog,
    };
    use progress_core::time::fixed_now;

    fn logging() -> LoggingState {
        LoggingState {
            content: Some(ContentRef::new(
                ChannelId::new("ch"),
                ContentId::new("c1"),
                ContentKind::Document,
            )),
            summary: Some(SummaryLog::fresh(fixed_now())),
            session: Some(SessionLog::fresh(fixed_now())),
            ..LoggingState::default()
        }
    }

    #[test]
    fn plan_skips_logs_without_ids() {
        let mut logging = logging();
        logging.session.as_mut().unwrap().progress = 0.4;
        let plan = plan_flush(&mut logging).unwrap();

        assert!(plan.summary.is_none());
        assert!(plan.session.is_none());
        assert_eq!(logging.session.unwrap().progress_at_last_save, 0.4);
    }

    #[test]
    fn plan_snapshots_persisted_logs() {
        let mut logging = logging();
        logging.summary.as_mut().unwrap().id = Some(SummaryLogId::new("s1"));
        let session = logging.session.as_mut().unwrap();
        session.id = Some(SessionLogId::new("se1"));
        session.time_spent = 12.0;

        let plan = plan_flush(&mut logging).unwrap();
        let (id, payload) = plan.session.unwrap();
        assert_eq!(id, SessionLogId::new("se1"));
        assert_eq!(payload["time_spent"], 12.0);
        assert_eq!(plan.summary.unwrap().0, SummaryLogId::new("s1"));
        assert_eq!(logging.session.unwrap().total_time_at_last_save, 12.0);
    }

    #[test]
    fn report_ignores_skipped_saves() {
        let report = FlushReport::default();
        assert!(report.is_ok());
        assert!(!report.saved_anything());

        let failed = FlushReport {
            summary: Some(Err(ResourceError::NotFound)),
            session: Some(Ok(())),
        };
        assert!(!failed.is_ok());
    }
}
