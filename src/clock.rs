use crate::events::Timestamp;
use chrono::Utc;

/// Source of the current time
///
/// The alert deduplicator and the source clients read the time through this
/// seam so cooldowns and look-back windows can be exercised in tests.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
