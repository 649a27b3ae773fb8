//! Single-file transfer from a database instance into the archive.

use super::retry::RetryPolicy;
use crate::{
    backends::{ArchiveWriter, LogReader},
    errors::{CopyError, WriteError},
    models::{DatabaseInstance, LogFile, SyncTarget},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Copies one log file at a time.
///
/// Each attempt streams the file from the source straight into the archive
/// writer under a per-attempt timeout. Writers replace the destination key,
/// so retrying a file is safe and never touches any other key.
#[derive(Clone)]
pub struct Copier {
    reader: Arc<dyn LogReader>,
    writer: Arc<dyn ArchiveWriter>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Copier {
    pub fn new(
        reader: Arc<dyn LogReader>,
        writer: Arc<dyn ArchiveWriter>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            reader,
            writer,
            retry,
            timeout,
        }
    }

    /// Copy `file` from `source` into `dest`, returning the bytes written.
    pub async fn copy(
        &self,
        file: &LogFile,
        source: &DatabaseInstance,
        dest: &SyncTarget,
    ) -> Result<u64, CopyError> {
        let what = format!("copying `{}`", file.name);
        self.retry
            .run(&what, || self.attempt(file, source, dest))
            .await
    }

    async fn attempt(
        &self,
        file: &LogFile,
        source: &DatabaseInstance,
        dest: &SyncTarget,
    ) -> Result<u64, CopyError> {
        let transfer = async {
            let body = self
                .reader
                .open(source, file)
                .await
                .map_err(|e| CopyError::SourceReadFailure {
                    name: file.name.clone(),
                    reason: e.to_string(),
                })?;

            self.writer
                .write(dest, &file.name, body)
                .await
                .map_err(|e| match e {
                    WriteError::Body(err) => CopyError::SourceReadFailure {
                        name: file.name.clone(),
                        reason: err.to_string(),
                    },
                    WriteError::Store(reason) => CopyError::DestinationWriteFailure {
                        key: dest.key_for(&file.name),
                        reason,
                    },
                })
        };

        match tokio::time::timeout(self.timeout, transfer).await {
            Ok(Ok(bytes)) => {
                debug!("copied `{}` ({} bytes) to {}", file.name, bytes, dest.uri());
                Ok(bytes)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CopyError::Timeout {
                name: file.name.clone(),
                after: self.timeout,
            }),
        }
    }
}
