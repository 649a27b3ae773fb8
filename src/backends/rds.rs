//! Amazon RDS as the source of instances and log files.

use super::{InstanceDiscoverer, LogReader, LogStream, SourceLister, source_unavailable};
use crate::{
    errors::DiscoveryError,
    models::{DatabaseInstance, LogFile},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_rds::{Client as RdsClient, error::DisplayErrorContext};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::io;
use tracing::{debug, warn};

/// Marker that asks `DownloadDBLogFilePortion` for the start of a file.
const START_MARKER: &str = "0";

/// RDS-backed discovery, listing and log download.
///
/// Holds a cloneable SDK client; one instance is shared by the whole run.
#[derive(Clone)]
pub struct RdsBackend {
    client: RdsClient,
}

impl RdsBackend {
    pub fn new(client: RdsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstanceDiscoverer for RdsBackend {
    async fn discover(&self) -> anyhow::Result<Vec<DatabaseInstance>> {
        let mut instances = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_db_instances()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
                .context("describing RDS instances")?;

            for db in response.db_instances() {
                let Some(identifier) = db.db_instance_identifier() else {
                    warn!("skipping RDS instance without identifier");
                    continue;
                };
                let instance = DatabaseInstance::with_engine(
                    identifier,
                    db.engine().unwrap_or_default(),
                )
                .with_context(|| format!("RDS instance `{}`", identifier))?;
                instances.push(instance);
            }

            match response.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(instances)
    }
}

#[async_trait]
impl SourceLister for RdsBackend {
    async fn list(&self, instance: &DatabaseInstance) -> Result<Vec<LogFile>, DiscoveryError> {
        let mut files = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_db_log_files()
                .db_instance_identifier(instance.name())
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| source_unavailable(instance, DisplayErrorContext(&e)))?;

            for details in response.describe_db_log_files() {
                let Some(name) = details.log_file_name() else {
                    continue;
                };
                let mut file = LogFile::new(name, details.size().unwrap_or(0).max(0) as u64);
                let written = details.last_written();
                if let Some(at) = written.and_then(DateTime::<Utc>::from_timestamp_millis) {
                    file = file.with_last_written(at);
                }
                files.push(file);
            }

            match response.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(instance = instance.name(), count = files.len(), "listed RDS log files");
        Ok(files)
    }
}

#[async_trait]
impl LogReader for RdsBackend {
    /// Stream a log file portion by portion until RDS reports no pending data.
    async fn open(&self, instance: &DatabaseInstance, file: &LogFile) -> io::Result<LogStream> {
        let client = self.client.clone();
        let identifier = instance.name().to_string();
        let name = file.name.clone();

        let portions = stream::try_unfold(Some(START_MARKER.to_string()), move |marker| {
            let client = client.clone();
            let identifier = identifier.clone();
            let name = name.clone();
            async move {
                let Some(marker) = marker else {
                    return Ok::<_, io::Error>(None);
                };
                let portion = client
                    .download_db_log_file_portion()
                    .db_instance_identifier(identifier)
                    .log_file_name(name)
                    .marker(marker)
                    .send()
                    .await
                    .map_err(|e| io::Error::other(DisplayErrorContext(&e).to_string()))?;

                let data = Bytes::from(portion.log_file_data().unwrap_or_default().to_owned());
                let next = if portion.additional_data_pending().unwrap_or(false) {
                    portion.marker().map(str::to_owned)
                } else {
                    None
                };
                Ok::<_, io::Error>(Some((data, next)))
            }
        });

        Ok(portions.boxed())
    }
}
