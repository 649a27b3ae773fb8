//! Local-disk archive.
//!
//! Mirrors the S3 key layout beneath a base directory:
//! `base_path/{bucket}/{prefix}{name}`. Writes stream into a temporary file
//! next to the destination, are fsynced, then renamed into place, so a reader
//! never observes a half-written log and a retried copy simply replaces it.

use super::{ArchiveLister, ArchiveWriter, DestinationProvisioner, LogStream, archive_unavailable};
use crate::{
    errors::{DiscoveryError, WriteError},
    models::{LogFile, SyncTarget},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const TMP_PREFIX: &str = ".tmp-";
const MAX_KEY_LEN: usize = 1024;

/// A temp file that is removed on drop unless it was renamed into place.
///
/// Covers every early return in `write` as well as a write future dropped
/// mid-stream by the copier's timeout.
struct TempPath {
    path: PathBuf,
    persisted: bool,
}

impl TempPath {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(mut self) {
        self.persisted = true;
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalArchive {
    /// Base directory holding one sub-directory per bucket.
    pub base_path: PathBuf,
}

impl LocalArchive {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn target_root(&self, target: &SyncTarget) -> PathBuf {
        let mut path = self.base_path.join(&target.bucket);
        path.extend(target.prefix.split('/').filter(|part| !part.is_empty()));
        path
    }

    /// Only called with names that passed `ensure_name_safe`, so each segment
    /// maps to exactly one path component.
    fn object_path(&self, target: &SyncTarget, name: &str) -> PathBuf {
        let mut path = self.target_root(target);
        path.extend(name.split('/'));
        path
    }

    /// Reject names that could escape the target directory or that the
    /// filesystem would store under a different name than the one listed back.
    fn ensure_name_safe(name: &str) -> Result<(), WriteError> {
        let unsafe_name = name.is_empty()
            || name.len() > MAX_KEY_LEN
            || name
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
            || name
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if unsafe_name {
            return Err(WriteError::Store(format!("invalid log file name `{}`", name)));
        }
        Ok(())
    }

    /// Walk `root` and collect every regular file, skipping in-flight temp files.
    async fn walk(root: &Path) -> io::Result<Vec<LogFile>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound && dir == root => {
                    return Ok(files);
                }
                Err(err) => return Err(err),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name();
                if file_name.to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let mut file = LogFile::new(name, meta.len());
                if let Ok(modified) = meta.modified() {
                    file = file.with_last_written(DateTime::<Utc>::from(modified));
                }
                files.push(file);
            }
        }

        // read_dir order is unspecified
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl DestinationProvisioner for LocalArchive {
    async fn ensure(&self, target: &SyncTarget) -> Result<(), DiscoveryError> {
        let root = self.target_root(target);
        fs::create_dir_all(&root)
            .await
            .map_err(|e| archive_unavailable(target, e))?;
        debug!("archive directory ready at {}", root.display());
        Ok(())
    }
}

#[async_trait]
impl ArchiveLister for LocalArchive {
    async fn list(&self, target: &SyncTarget) -> Result<Vec<LogFile>, DiscoveryError> {
        Self::walk(&self.target_root(target))
            .await
            .map_err(|e| archive_unavailable(target, e))
    }
}

#[async_trait]
impl ArchiveWriter for LocalArchive {
    async fn write(
        &self,
        target: &SyncTarget,
        name: &str,
        mut body: LogStream,
    ) -> Result<u64, WriteError> {
        Self::ensure_name_safe(name)?;

        let file_path = self.object_path(target, name);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            WriteError::Store(format!("{} has no parent directory", file_path.display()))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp = TempPath::new(parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4())));
        let mut file = File::create(tmp.path()).await?;

        let mut size: u64 = 0;
        let mut digest = Context::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(WriteError::Body)?;
            size += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(tmp.path(), &file_path).await {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(err.into());
            }
            fs::remove_file(&file_path).await?;
            fs::rename(tmp.path(), &file_path).await?;
        }
        tmp.persisted();

        debug!(
            "wrote {} bytes to {} (md5 {:x})",
            size,
            file_path.display(),
            digest.compute()
        );
        Ok(size)
    }
}
