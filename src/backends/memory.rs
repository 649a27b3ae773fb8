//! In-memory backends with injectable failures, for orchestrator and driver tests.

use super::{
    ArchiveLister, ArchiveWriter, DestinationProvisioner, InstanceDiscoverer, LogReader,
    LogStream, SourceLister, archive_unavailable, source_unavailable,
};
use crate::{
    errors::{DiscoveryError, WriteError},
    models::{DatabaseInstance, LogFile, SyncTarget},
};
use anyhow::Context;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::Mutex,
    time::Duration,
};

pub struct MemoryDiscoverer {
    names: Option<Vec<String>>,
}

impl MemoryDiscoverer {
    /// Report `names` as discovered; they are validated on `discover`, like
    /// identifiers coming back from RDS.
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: Some(names.iter().map(|n| n.to_string()).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { names: None }
    }
}

#[async_trait]
impl InstanceDiscoverer for MemoryDiscoverer {
    async fn discover(&self) -> anyhow::Result<Vec<DatabaseInstance>> {
        let names = self
            .names
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("access denied"))?;
        names
            .iter()
            .map(|n| {
                DatabaseInstance::new(n.as_str()).with_context(|| format!("instance `{}`", n))
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Vec<(String, Bytes)>>>,
    unavailable: Mutex<HashSet<String>>,
    /// Remaining read failures per file name; `u32::MAX` fails forever.
    read_failures: Mutex<HashMap<String, u32>>,
    read_delay: Mutex<HashMap<String, Duration>>,
    opens: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn add(&self, instance: &str, name: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(instance.to_string())
            .or_default()
            .push((name.to_string(), Bytes::from(content.to_string())));
    }

    pub fn make_unavailable(&self, instance: &str) {
        self.unavailable.lock().unwrap().insert(instance.to_string());
    }

    pub fn fail_reads(&self, name: &str, times: u32) {
        self.read_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
    }

    pub fn delay_reads(&self, name: &str, delay: Duration) {
        self.read_delay
            .lock()
            .unwrap()
            .insert(name.to_string(), delay);
    }

    /// File names passed to `open`, in call order.
    pub fn opens(&self) -> Vec<String> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceLister for MemorySource {
    async fn list(&self, instance: &DatabaseInstance) -> Result<Vec<LogFile>, DiscoveryError> {
        if self.unavailable.lock().unwrap().contains(instance.name()) {
            return Err(source_unavailable(instance, "access denied"));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(instance.name())
            .map(|files| {
                files
                    .iter()
                    .map(|(name, data)| LogFile::new(name.clone(), data.len() as u64))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl LogReader for MemorySource {
    async fn open(&self, instance: &DatabaseInstance, file: &LogFile) -> io::Result<LogStream> {
        self.opens.lock().unwrap().push(file.name.clone());

        let delay = self.read_delay.lock().unwrap().get(&file.name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.read_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&file.name) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(io::Error::other("log portion unavailable"));
                }
            }
        }

        let data = self
            .files
            .lock()
            .unwrap()
            .get(instance.name())
            .and_then(|files| files.iter().find(|(n, _)| *n == file.name))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, file.name.clone()))?;

        // two chunks, to exercise concatenation in writers
        let mid = data.len() / 2;
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
        Ok(stream::iter(chunks).boxed())
    }
}

#[derive(Default)]
pub struct MemoryArchive {
    /// `(bucket, key)` to stored bytes.
    objects: Mutex<BTreeMap<(String, String), Bytes>>,
    unavailable: Mutex<HashSet<String>>,
    unprovisionable: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
    provisioned: Mutex<Vec<String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryArchive {
    pub fn put(&self, target: &SyncTarget, name: &str, content: &str) {
        self.objects.lock().unwrap().insert(
            (target.bucket.clone(), target.key_for(name)),
            Bytes::from(content.to_string()),
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn make_unavailable(&self, prefix: &str) {
        self.unavailable.lock().unwrap().insert(prefix.to_string());
    }

    pub fn make_unprovisionable(&self, prefix: &str) {
        self.unprovisionable
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn reject_writes(&self, key: &str) {
        self.rejected.lock().unwrap().insert(key.to_string());
    }

    /// Prefixes passed to `ensure`, in call order.
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().unwrap().clone()
    }

    /// Keys passed to `write`, in call order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationProvisioner for MemoryArchive {
    async fn ensure(&self, target: &SyncTarget) -> Result<(), DiscoveryError> {
        if self.unprovisionable.lock().unwrap().contains(&target.prefix) {
            return Err(archive_unavailable(target, "bucket not creatable"));
        }
        self.provisioned.lock().unwrap().push(target.prefix.clone());
        Ok(())
    }
}

#[async_trait]
impl ArchiveLister for MemoryArchive {
    async fn list(&self, target: &SyncTarget) -> Result<Vec<LogFile>, DiscoveryError> {
        if self.unavailable.lock().unwrap().contains(&target.prefix) {
            return Err(archive_unavailable(target, "access denied"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((bucket, _), _)| *bucket == target.bucket)
            .filter_map(|((_, key), data)| {
                target
                    .name_for(key)
                    .map(|name| LogFile::new(name, data.len() as u64))
            })
            .collect())
    }
}

#[async_trait]
impl ArchiveWriter for MemoryArchive {
    async fn write(
        &self,
        target: &SyncTarget,
        name: &str,
        mut body: LogStream,
    ) -> Result<u64, WriteError> {
        let key = target.key_for(name);
        self.writes.lock().unwrap().push(key.clone());

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(WriteError::Body)?);
        }
        if self.rejected.lock().unwrap().contains(&key) {
            return Err(WriteError::Store("access denied".into()));
        }

        let size = buffer.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert((target.bucket.clone(), key), buffer.freeze());
        Ok(size)
    }
}
