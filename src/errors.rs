//! Error taxonomy for a sync run.
//!
//! Errors are scoped by how far they reach: a `CopyError` stays with one file,
//! a `DiscoveryError` stays with one instance, and only `RunError` (instance
//! discovery or configuration) stops the whole run.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Listing or provisioning failed; fatal for one instance's cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum DiscoveryError {
    #[error("source `{instance}` unavailable: {reason}")]
    SourceUnavailable { instance: String, reason: String },
    #[error("archive `s3://{bucket}/{prefix}` unavailable: {reason}")]
    ArchiveUnavailable {
        bucket: String,
        prefix: String,
        reason: String,
    },
}

/// Copying a single log file failed; the rest of the copy set is unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum CopyError {
    #[error("reading `{name}` from source failed: {reason}")]
    SourceReadFailure { name: String, reason: String },
    #[error("writing `{key}` to archive failed: {reason}")]
    DestinationWriteFailure { key: String, reason: String },
    #[error("copying `{name}` timed out after {after:?}")]
    Timeout { name: String, after: Duration },
}

/// Invalid settings or instance identity, surfaced before any instance runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("destination bucket must not be empty")]
    EmptyBucket,
    #[error("archive prefix must not be empty")]
    EmptyPrefix,
    #[error("instance name must not be empty")]
    EmptyInstanceName,
    #[error("instance name `{0}` must not contain `/` or be `.` or `..`")]
    MalformedInstanceName(String),
    #[error("instances `{0}` share the archive prefix `{1}`")]
    PrefixCollision(String, String),
    #[error("`{name}` must be at least 1, got {value}")]
    OutOfRange { name: &'static str, value: u64 },
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("instance discovery failed: {0}")]
    Discovery(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure surfaced by an archive writer.
///
/// `Body` means the byte stream handed to the writer failed, which the copier
/// attributes to the source; `Store` means the archive itself rejected the write.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("body stream failed: {0}")]
    Body(#[source] std::io::Error),
    #[error("{0}")]
    Store(String),
}

impl From<std::io::Error> for WriteError {
    fn from(err: std::io::Error) -> Self {
        WriteError::Store(err.to_string())
    }
}
