//! Clock abstraction
//!
//! Every timestamp the page tree writes (`updated_at`, `archived_at`,
//! `deleted_at`, `last_saved_at`, visit times) comes from a `TimeProvider`.
//! Tests swap in `MockTimeProvider` to step across the
//! coalescing and restore windows without sleeping.
//!
//! ```rust
//! use pagetree_core::models::time::{MockTimeProvider, TimeProvider};
//! use chrono::Duration;
//!
//! let clock = MockTimeProvider::new();
//! let saved = clock.now();
//! clock.advance(Duration::seconds(601));
//! assert!(clock.now() - saved > Duration::seconds(600));
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard};

/// Source of "now" for page operations
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests
///
/// Moves through `&self`, so one `Arc<MockTimeProvider>` can be kept by the
/// test and handed to `PageService::with_clock` at the same time.
#[derive(Debug)]
pub struct MockTimeProvider {
    instant: Mutex<DateTime<Utc>>,
}

impl MockTimeProvider {
    /// Start at the current wall-clock time
    pub fn new() -> Self {
        Self::with_time(Utc::now())
    }

    pub fn with_time(start: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(start),
        }
    }

    /// Jump to `instant`, backwards or forwards
    pub fn set_time(&self, instant: DateTime<Utc>) {
        *self.instant() = instant;
    }

    pub fn advance(&self, step: Duration) {
        *self.instant() += step;
    }

    fn instant(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.instant
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TimeProvider for MockTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.instant()
    }
}

impl Default for MockTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}
