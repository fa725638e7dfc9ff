use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Measures wall time between successive reads.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    last: Arc<Mutex<Instant>>,
}

impl IntervalTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Time since the previous read (or start), resetting the mark.
    #[must_use]
    pub fn take_elapsed(&self) -> Duration {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(*last);
        *last = now;
        elapsed
    }
}
