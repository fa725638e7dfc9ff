mod attempt;
mod catalog;
mod ids;
mod mastery;
mod progress_log;
mod session;

pub use ids::{
    AttemptLogId, ChannelId, ContentId, FacilityId, ItemId, MasteryLogId, ParseIdError,
    SessionLogId, SummaryLogId, UserId,
};

pub use attempt::{AttemptLog, INTERACTION_FIELDS, Interaction, InteractionType};
pub use catalog::{
    Channel, ContentKind, ContentRef, Facility, FacilityConfig, UnknownContentKind, UserProgress,
};
pub use mastery::{MasteryCriterion, MasteryLog, Persistence};
pub use progress_log::{COMPLETE_PROGRESS, SessionLog, SummaryLog, clamp_progress};
pub use session::{CURRENT_SESSION_ID, Credentials, Session, UserKind};
