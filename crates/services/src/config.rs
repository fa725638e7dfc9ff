use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const PROGRESS_THRESHOLD_VAR: &str = "LEARN_PROGRESS_THRESHOLD";
pub const TIME_THRESHOLD_VAR: &str = "LEARN_TIME_THRESHOLD_SECS";
pub const TICK_INTERVAL_VAR: &str = "LEARN_TICK_INTERVAL_SECS";

/// Flush thresholds and timer cadence for the progress tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Unsaved session progress that forces a flush.
    pub progress_threshold: f64,
    /// Unsaved session seconds that force a flush.
    pub time_threshold_secs: f64,
    pub tick_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            progress_threshold: 0.1,
            time_threshold_secs: 30.0,
            tick_interval: Duration::from_secs(5),
        }
    }
}

impl TrackerConfig {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read overrides through `lookup`, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value is not a positive finite number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let progress_threshold =
            parse_positive(&lookup, PROGRESS_THRESHOLD_VAR, defaults.progress_threshold)?;
        let time_threshold_secs =
            parse_positive(&lookup, TIME_THRESHOLD_VAR, defaults.time_threshold_secs)?;
        let tick_secs = parse_positive(
            &lookup,
            TICK_INTERVAL_VAR,
            defaults.tick_interval.as_secs_f64(),
        )?;
        Ok(Self {
            progress_threshold,
            time_threshold_secs,
            tick_interval: Duration::from_secs_f64(tick_secs),
        })
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value > 0.0)
            .ok_or(ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
