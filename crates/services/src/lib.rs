#![forbid(unsafe_code)]

pub mod app_services;
pub mod channels;
pub mod config;
pub mod content_session;
pub mod cookies;
pub mod epoch;
pub mod error;
pub mod mastery;
pub mod session_controller;
pub mod store;
pub mod tracking;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use channels::{CHANNEL_COOKIE, ChannelService};
pub use config::TrackerConfig;
pub use content_session::{ContentSessionCoordinator, ContentSessionStarted, SummarySource};
pub use cookies::{CookieJar, FileCookieJar, MemoryCookieJar};
pub use epoch::{PageEpoch, PageToken};
pub use error::{ChannelError, ConfigError, CookieError, LoggingError, SessionError};
pub use mastery::{AttemptUpdate, MasteryInit, MasteryManager, WriteOutcome};
pub use session_controller::{Redirect, SessionController};
pub use store::{ChannelState, CoreState, CoreStatus, LoggingState, Store};
pub use tracking::{FlushReport, PendingFlush, ProgressTracker, ProgressUpdate, TimeUpdate};
