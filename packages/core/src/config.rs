//! Runtime configuration for the page tree
//!
//! `PageTreeConfig` carries the database location and the two time windows
//! that drive version coalescing and restore matching. Defaults match the
//! production values; `from_env()` lets binaries override them.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Repeated saves by the same editor within this many seconds update one version
pub const DEFAULT_VERSION_COALESCE_WINDOW_SECS: i64 = 600;

/// Versions saved within this many seconds of a deletion are restored with the page
pub const DEFAULT_RESTORE_WINDOW_SECS: i64 = 120;

/// Busy timeout applied to every SQLite connection
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Broadcast channel capacity for page events
///
/// 128 leaves headroom for a cascade over a large subtree; lagging
/// subscribers drop the oldest events.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Number of recent visits returned per user
pub const DEFAULT_RECENT_VISITS_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageTreeConfig {
    /// Path to the libsql database file
    pub database_path: PathBuf,

    pub version_coalesce_window_secs: i64,

    pub restore_window_secs: i64,

    pub busy_timeout_ms: u64,

    pub event_channel_capacity: usize,

    pub recent_visits_limit: usize,
}

impl Default for PageTreeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/pagetree.db"),
            version_coalesce_window_secs: DEFAULT_VERSION_COALESCE_WINDOW_SECS,
            restore_window_secs: DEFAULT_RESTORE_WINDOW_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            recent_visits_limit: DEFAULT_RECENT_VISITS_LIMIT,
        }
    }
}

impl PageTreeConfig {
    /// Config rooted at a specific database file, other values default
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Build config from `PAGETREE_*` environment variables
    ///
    /// - `PAGETREE_DB_PATH`
    /// - `PAGETREE_COALESCE_WINDOW_SECS`
    /// - `PAGETREE_RESTORE_WINDOW_SECS`
    /// - `PAGETREE_BUSY_TIMEOUT_MS`
    /// - `PAGETREE_EVENT_CHANNEL_CAPACITY`
    /// - `PAGETREE_RECENT_VISITS_LIMIT`
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_path: lookup("PAGETREE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            version_coalesce_window_secs: parse_or(
                &lookup,
                "PAGETREE_COALESCE_WINDOW_SECS",
                defaults.version_coalesce_window_secs,
            ),
            restore_window_secs: parse_or(
                &lookup,
                "PAGETREE_RESTORE_WINDOW_SECS",
                defaults.restore_window_secs,
            ),
            busy_timeout_ms: parse_or(
                &lookup,
                "PAGETREE_BUSY_TIMEOUT_MS",
                defaults.busy_timeout_ms,
            ),
            event_channel_capacity: parse_or(
                &lookup,
                "PAGETREE_EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            ),
            recent_visits_limit: parse_or(
                &lookup,
                "PAGETREE_RECENT_VISITS_LIMIT",
                defaults.recent_visits_limit,
            ),
        }
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::seconds(self.version_coalesce_window_secs)
    }

    pub fn restore_window(&self) -> Duration {
        Duration::seconds(self.restore_window_secs)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}
