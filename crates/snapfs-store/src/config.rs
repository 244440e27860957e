use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Behavior knobs for the store and the components built on it.
///
/// Threaded explicitly into whatever needs them at construction time; there
/// is no global mutable configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Commit on every write call instead of waiting for flush/close.
    pub commit_on_write: bool,
    /// Reject every mutating operation with `ReadOnly`.
    pub read_only: bool,
    /// Interval at which open handles are marked for a forced commit on
    /// their next write. Zero disables the periodic flusher.
    pub flush_interval_secs: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            commit_on_write: false,
            read_only: false,
            flush_interval_secs: 30,
        }
    }
}

impl FsConfig {
    /// The flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}
