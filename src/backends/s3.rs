//! Amazon S3 as the archive.

use super::{ArchiveLister, ArchiveWriter, DestinationProvisioner, LogStream, archive_unavailable};
use crate::{
    errors::{DiscoveryError, WriteError},
    models::{LogFile, SyncTarget},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info};

/// Region in which `CreateBucket` must not carry a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Continuation token for the next `ListObjectsV2` page, or `None` when the
/// listing is complete. A truncated page without a token would restart the
/// listing from the beginning, so it is an error.
fn next_page(is_truncated: bool, token: Option<&str>) -> Result<Option<String>, &'static str> {
    match (is_truncated, token) {
        (false, _) => Ok(None),
        (true, Some(token)) if !token.is_empty() => Ok(Some(token.to_string())),
        (true, _) => Err("truncated listing returned no continuation token"),
    }
}

/// S3-backed archive listing, writing and bucket provisioning.
#[derive(Clone)]
pub struct S3Archive {
    client: S3Client,
}

impl S3Archive {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    async fn create_bucket(&self, target: &SyncTarget) -> Result<(), DiscoveryError> {
        let mut request = self.client.create_bucket().bucket(&target.bucket);
        if let Some(region) = self.client.config().region() {
            if region.as_ref() != DEFAULT_REGION {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region.as_ref()))
                        .build(),
                );
            }
        }

        match request.send().await {
            Ok(_) => {
                info!("created bucket s3://{}", target.bucket);
                Ok(())
            }
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_bucket_already_owned_by_you() {
                    Ok(())
                } else {
                    Err(archive_unavailable(
                        target,
                        DisplayErrorContext(&service_error),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl DestinationProvisioner for S3Archive {
    /// Check the bucket exists and create it when it does not. Prefixes need
    /// no provisioning in S3.
    async fn ensure(&self, target: &SyncTarget) -> Result<(), DiscoveryError> {
        match self.client.head_bucket().bucket(&target.bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    self.create_bucket(target).await
                } else {
                    Err(archive_unavailable(
                        target,
                        DisplayErrorContext(&service_error),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl ArchiveLister for S3Archive {
    async fn list(&self, target: &SyncTarget) -> Result<Vec<LogFile>, DiscoveryError> {
        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&target.bucket)
                .prefix(&target.prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| archive_unavailable(target, DisplayErrorContext(&e)))?;

            for object in response.contents() {
                let Some(name) = object.key().and_then(|key| target.name_for(key)) else {
                    continue;
                };
                let mut file = LogFile::new(name, object.size().unwrap_or(0).max(0) as u64);
                if let Some(at) = object.last_modified().and_then(|dt| {
                    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
                }) {
                    file = file.with_last_written(at);
                }
                files.push(file);
            }

            match next_page(
                response.is_truncated().unwrap_or(false),
                response.next_continuation_token(),
            ) {
                Ok(Some(token)) => continuation_token = Some(token),
                Ok(None) => break,
                Err(reason) => return Err(archive_unavailable(target, reason)),
            }
        }

        debug!("found {} objects in {}", files.len(), target.uri());
        Ok(files)
    }
}

#[async_trait]
impl ArchiveWriter for S3Archive {
    /// Buffer the body, then upload it in one `PutObject` with a `Content-MD5`
    /// header so S3 rejects anything that did not arrive intact. `PutObject`
    /// replaces an existing key, so a retried copy overwrites cleanly.
    async fn write(
        &self,
        target: &SyncTarget,
        name: &str,
        mut body: LogStream,
    ) -> Result<u64, WriteError> {
        let key = target.key_for(name);

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(WriteError::Body)?);
        }
        let size = buffer.len() as u64;
        let digest = md5::compute(&buffer);

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&key)
            .content_md5(general_purpose::STANDARD.encode(digest.0))
            .content_type("text/plain")
            .body(ByteStream::from(buffer.freeze()))
            .send()
            .await
            .map_err(|e| WriteError::Store(DisplayErrorContext(&e).to_string()))?;

        debug!("uploaded {} bytes to s3://{}/{}", size, target.bucket, key);
        Ok(size)
    }
}
