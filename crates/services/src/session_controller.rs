use std::sync::Arc;

use progress_core::mapping::decode_record;
use progress_core::model::{
    CURRENT_SESSION_ID, Credentials, Facility, FacilityConfig, Session, UserProgress,
};
use progress_core::MappingError;
use resources::{Collection, Filter, ResourceClient, ResourceError};
use tracing::{info, warn};

use crate::error::SessionError;
use crate::store::{LoggingState, Store};

/// Where the shell should navigate after a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// First sign-in on a fresh device.
    DeviceWelcome,
    /// Admin or superuser landing page.
    Management,
    /// Learner landing page.
    Home,
    /// Reload the current page.
    Reload,
}

impl Redirect {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Redirect::DeviceWelcome => "/device/#/welcome",
            Redirect::Management => "/management/",
            Redirect::Home => "/learn/",
            Redirect::Reload => "",
        }
    }

    fn after_login(session: &Session, first_device_sign_in: bool) -> Self {
        if first_device_sign_in && session.is_superuser() {
            Redirect::DeviceWelcome
        } else if session.is_superuser() || session.is_admin() {
            Redirect::Management
        } else {
            Redirect::Home
        }
    }
}

/// Sign-in, sign-out and session bootstrap.
#[derive(Clone)]
pub struct SessionController {
    store: Store,
    client: Arc<dyn ResourceClient>,
}

impl SessionController {
    #[must_use]
    pub fn new(store: Store, client: Arc<dyn ResourceClient>) -> Self {
        Self { store, client }
    }

    fn fail(&self, err: ResourceError) -> SessionError {
        self.store.handle_api_error(&err);
        SessionError::Api(err)
    }

    fn fail_mapping(&self, err: MappingError) -> SessionError {
        self.store.handle_mapping_error(&err);
        SessionError::Mapping(err)
    }

    /// Create a server session for `credentials`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::BadCredentials` on a 401, recording it as the
    /// login error. Other failures, including an unreadable session record,
    /// are recorded as the core error. Loading is cleared on every path.
    pub async fn login(
        &self,
        credentials: &Credentials,
        first_device_sign_in: bool,
    ) -> Result<Redirect, SessionError> {
        self.store.update(|state| {
            state.status.login_error = None;
            state.status.loading = true;
        });
        let payload = serde_json::to_value(credentials)
            .map_err(|source| MappingError::Encode {
                what: "credentials",
                source,
            })
            .map_err(|err| self.fail_mapping(err))?;

        let record = match self.client.create(Collection::Session, payload).await {
            Ok(record) => record,
            Err(err) if err.is_unauthorized() => {
                warn!(username = %credentials.username, "sign-in rejected");
                self.store.update(|state| {
                    state.status.login_error = err.status();
                    state.status.loading = false;
                });
                return Err(SessionError::BadCredentials);
            }
            Err(err) => return Err(self.fail(err)),
        };

        let session: Session =
            decode_record("session", record).map_err(|err| self.fail_mapping(err))?;
        let redirect = Redirect::after_login(&session, first_device_sign_in);
        info!(username = %session.username, ?redirect, "signed in");
        self.store.update(|state| {
            state.session = session;
            state.status.loading = false;
        });
        Ok(redirect)
    }

    /// Destroy the server session and drop every cached resource.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` if the delete fails; the cache is kept.
    pub async fn logout(&self) -> Result<Redirect, SessionError> {
        self.client
            .delete(Collection::Session, CURRENT_SESSION_ID)
            .await
            .map_err(|err| self.fail(err))?;
        self.client.clear_cache();
        self.store.update(|state| {
            state.session = Session::anonymous();
            state.logging = LoggingState::default();
            state.total_progress = None;
        });
        info!("signed out");
        Ok(Redirect::Reload)
    }

    /// Load the current session, attaching the default facility if it has none.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` or `SessionError::Mapping` on failure.
    pub async fn get_current_session(&self, force: bool) -> Result<Session, SessionError> {
        let record = self
            .client
            .fetch_one(Collection::Session, CURRENT_SESSION_ID, force)
            .await
            .map_err(|err| self.fail(err))?;
        let mut session: Session = decode_record("session", record)?;

        if session.facility_id.is_none() {
            let facilities = self
                .client
                .fetch_collection(Collection::Facility, &Filter::new())
                .await
                .map_err(|err| self.fail(err))?;
            if let Some(first) = facilities.into_iter().next() {
                let facility: Facility = decode_record("facility", first)?;
                session.facility_id = Some(facility.id);
            }
        }

        self.store.update(|state| state.session = session.clone());
        Ok(session)
    }

    /// Refresh aggregate progress for the signed-in user.
    ///
    /// Anonymous and privileged sessions have no progress and make no request.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` or `SessionError::Mapping` on failure.
    pub async fn fetch_points(&self) -> Result<u64, SessionError> {
        let Some(user) = self.store.read(|state| state.session.log_user()) else {
            self.store.update(|state| state.total_progress = Some(0.0));
            return Ok(0);
        };
        let record = self
            .client
            .fetch_one(Collection::UserProgress, user.as_str(), true)
            .await
            .map_err(|err| self.fail(err))?;
        let progress: UserProgress = decode_record("user progress", record)?;
        Ok(self.store.update(|state| {
            state.total_progress = Some(progress.progress);
            state.total_points()
        }))
    }

    /// Load sign-in policy for the session's facility.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoFacility` before a facility is known.
    pub async fn fetch_facility_config(&self) -> Result<FacilityConfig, SessionError> {
        let facility = self
            .store
            .read(|state| state.session.facility_id.clone())
            .ok_or(SessionError::NoFacility)?;
        let datasets = self
            .client
            .fetch_collection(
                Collection::FacilityDataset,
                &Filter::new().with("facility_id", &facility),
            )
            .await
            .map_err(|err| self.fail(err))?;
        let config: FacilityConfig = match datasets.into_iter().next() {
            Some(dataset) => decode_record("facility dataset", dataset)?,
            None => FacilityConfig::default(),
        };
        self.store
            .update(|state| state.facility_config = Some(config.clone()));
        Ok(config)
    }
}
