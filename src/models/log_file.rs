//! A single database log file, as seen at the source or in the archive.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name + size descriptor of one log file.
///
/// The same type describes files on both sides of the sync so listings can be
/// compared directly. `name` is unique within one listing.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    /// Path-like identifier within the instance's log namespace
    /// (e.g. `error/mysql-error-running.log.3`).
    pub name: String,

    /// Size in bytes at listing time.
    pub size: u64,

    /// Last write time reported by the backend, if it reports one.
    /// Informational only; never used when computing the copy set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_written: Option<DateTime<Utc>>,
}

impl LogFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_written: None,
        }
    }

    pub fn with_last_written(mut self, at: DateTime<Utc>) -> Self {
        self.last_written = Some(at);
        self
    }
}
