use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api/";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiConfigError {
    #[error("invalid API base URL `{raw}`: {reason}")]
    InvalidBaseUrl { raw: String, reason: String },
    #[error("{0} must be a positive integer")]
    InvalidTimeout(&'static str),
}

/// Where the resource API lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Build a config from a base URL, appending a trailing slash if missing.
    ///
    /// # Errors
    ///
    /// Returns `ApiConfigError::InvalidBaseUrl` if the URL cannot be parsed
    /// or cannot carry path segments.
    pub fn new(base_url: &str) -> Result<Self, ApiConfigError> {
        let raw = base_url.trim();
        let normalized = if raw.ends_with('/') {
            raw.to_owned()
        } else {
            format!("{raw}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| ApiConfigError::InvalidBaseUrl {
            raw: raw.to_owned(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiConfigError::InvalidBaseUrl {
                raw: raw.to_owned(),
                reason: "URL cannot be a base".into(),
            });
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `LEARN_API_BASE_URL` and `LEARN_API_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ApiConfigError` when either variable holds an invalid value.
    pub fn from_env() -> Result<Self, ApiConfigError> {
        let base = env::var("LEARN_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.into());
        let timeout = match env::var("LEARN_API_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ApiConfigError::InvalidTimeout("LEARN_API_TIMEOUT_SECS"))?,
            Err(_) => DEFAULT_API_TIMEOUT_SECS,
        };
        Ok(Self::new(&base)?.with_timeout(Duration::from_secs(timeout)))
    }
}
