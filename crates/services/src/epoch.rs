use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic page counter shared by every service.
///
/// Writes capture a token when they start and drop their results if the
/// page has changed by the time they resolve.
#[derive(Debug, Clone, Default)]
pub struct PageEpoch(Arc<AtomicU64>);

/// Snapshot of the page counter taken when a write started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(u64);

impl PageEpoch {
    #[must_use]
    pub fn token(&self) -> PageToken {
        PageToken(self.0.load(Ordering::Acquire))
    }

    /// Move to a new page, invalidating every outstanding token.
    pub fn advance(&self) -> PageToken {
        PageToken(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    #[must_use]
    pub fn is_current(&self, token: PageToken) -> bool {
        self.token() == token
    }
}
