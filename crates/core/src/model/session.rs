use serde::{Deserialize, Serialize};

use crate::model::{FacilityId, UserId};

/// Role attached to a signed-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Anonymous,
    Learner,
    Coach,
    Admin,
    Superuser,
    /// Any role this client does not act on, such as `facility_manager`.
    #[serde(other)]
    Other,
}

/// Authentication state for the current device session.
///
/// Mirrors the `session/current` record returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "current_session_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub facility_id: Option<FacilityId>,
    #[serde(default = "anonymous_kind")]
    pub kind: Vec<UserKind>,
}

/// Id of the singleton session resource.
pub const CURRENT_SESSION_ID: &str = "current";

fn current_session_id() -> String {
    CURRENT_SESSION_ID.to_owned()
}

fn anonymous_kind() -> Vec<UserKind> {
    vec![UserKind::Anonymous]
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: current_session_id(),
            user_id: None,
            username: String::new(),
            full_name: String::new(),
            facility_id: None,
            kind: anonymous_kind(),
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() || self.kind.contains(&UserKind::Anonymous)
    }

    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.kind.contains(&UserKind::Superuser)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.kind.contains(&UserKind::Admin)
    }

    /// A signed-in, non-superuser account whose progress is attributed to them.
    #[must_use]
    pub fn is_tracked_user(&self) -> bool {
        !self.is_anonymous() && !self.is_superuser()
    }

    /// User to attach to new log records; superusers are logged anonymously.
    #[must_use]
    pub fn log_user(&self) -> Option<UserId> {
        if self.is_tracked_user() {
            self.user_id.clone()
        } else {
            None
        }
    }
}

/// Sign-in payload posted to the session collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<FacilityId>,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            facility: None,
        }
    }

    #[must_use]
    pub fn with_facility(mut self, facility: FacilityId) -> Self {
        self.facility = Some(facility);
        self
    }
}
