//! Backend seams: where instances, source logs and archived logs come from.
//!
//! Each external service is modeled as a capability trait with one concrete
//! implementation per backend kind. The orchestrator only ever sees the traits.

pub mod local;
#[cfg(test)]
pub mod memory;
pub mod rds;
pub mod s3;

use crate::{
    errors::{DiscoveryError, WriteError},
    models::{DatabaseInstance, LogFile, SyncTarget},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, sync::Arc};

/// Byte stream of one log file's content.
pub type LogStream = BoxStream<'static, io::Result<Bytes>>;

/// Enumerates the database instances a run should process.
#[async_trait]
pub trait InstanceDiscoverer: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<DatabaseInstance>>;
}

/// Makes sure an archive namespace exists before it is listed or written.
#[async_trait]
pub trait DestinationProvisioner: Send + Sync {
    async fn ensure(&self, target: &SyncTarget) -> Result<(), DiscoveryError>;
}

/// Log files available on a database instance.
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Complete listing; pagination is exhausted internally.
    async fn list(&self, instance: &DatabaseInstance) -> Result<Vec<LogFile>, DiscoveryError>;
}

/// Reads a log file's bytes from a database instance.
#[async_trait]
pub trait LogReader: Send + Sync {
    async fn open(&self, instance: &DatabaseInstance, file: &LogFile) -> io::Result<LogStream>;
}

/// Log files already present under an archive target.
#[async_trait]
pub trait ArchiveLister: Send + Sync {
    /// Complete listing, names relative to the target prefix.
    async fn list(&self, target: &SyncTarget) -> Result<Vec<LogFile>, DiscoveryError>;
}

/// Writes a log file under an archive target.
#[async_trait]
pub trait ArchiveWriter: Send + Sync {
    /// Store `body` at `target.key_for(name)`, replacing any previous object,
    /// and return the number of bytes written.
    async fn write(
        &self,
        target: &SyncTarget,
        name: &str,
        body: LogStream,
    ) -> Result<u64, WriteError>;
}

/// The full set of collaborators one run talks to.
///
/// Each backend is shared behind an `Arc`; a concrete type that implements
/// several capabilities is cloned into each slot it fills.
#[derive(Clone)]
pub struct Backends {
    pub discoverer: Arc<dyn InstanceDiscoverer>,
    pub source_lister: Arc<dyn SourceLister>,
    pub reader: Arc<dyn LogReader>,
    pub provisioner: Arc<dyn DestinationProvisioner>,
    pub archive_lister: Arc<dyn ArchiveLister>,
    pub writer: Arc<dyn ArchiveWriter>,
}

impl Backends {
    pub fn new<D, S, A>(discoverer: Arc<D>, source: Arc<S>, archive: Arc<A>) -> Self
    where
        D: InstanceDiscoverer + 'static,
        S: SourceLister + LogReader + 'static,
        A: ArchiveLister + ArchiveWriter + DestinationProvisioner + 'static,
    {
        Self {
            discoverer,
            source_lister: source.clone(),
            reader: source,
            provisioner: archive.clone(),
            archive_lister: archive.clone(),
            writer: archive,
        }
    }
}

pub(crate) fn archive_unavailable(target: &SyncTarget, reason: impl ToString) -> DiscoveryError {
    DiscoveryError::ArchiveUnavailable {
        bucket: target.bucket.clone(),
        prefix: target.prefix.clone(),
        reason: reason.to_string(),
    }
}

pub(crate) fn source_unavailable(
    instance: &DatabaseInstance,
    reason: impl ToString,
) -> DiscoveryError {
    DiscoveryError::SourceUnavailable {
        instance: instance.name().to_string(),
        reason: reason.to_string(),
    }
}
