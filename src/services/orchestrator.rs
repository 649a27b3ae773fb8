//! One instance's sync cycle: provision, list, diff, copy.

use super::{copier::Copier, delta, retry::RetryPolicy};
use crate::{
    backends::{ArchiveLister, Backends, DestinationProvisioner, SourceLister},
    errors::{CopyError, DiscoveryError},
    models::{LogFile, SyncTarget},
    observability::SyncObserver,
};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// Where an instance cycle currently is.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Listing,
    Diffing,
    Copying,
    Done,
    Failed,
}

/// How an instance cycle ended, as reported to monitoring.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Every selected file was copied (including an empty copy set).
    Synced,
    /// Some selected files were copied, some failed.
    Partial,
    /// Files were selected and none of them could be copied.
    CopyFailed,
    /// The copy set could not be determined.
    Failed,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub source_files: usize,
    pub archive_files: usize,
    pub selected: usize,
    pub copied: usize,
    pub failed: usize,
    pub bytes_copied: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FailedCopy {
    pub name: String,
    pub error: CopyError,
}

/// Result of one instance cycle.
#[derive(Serialize, Clone, Debug)]
pub struct InstanceOutcome {
    pub instance: String,
    pub engine: String,
    pub archive: String,
    pub state: SyncState,
    pub counts: SyncCounts,
    pub failed_copies: Vec<FailedCopy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DiscoveryError>,
}

impl InstanceOutcome {
    fn new(target: &SyncTarget) -> Self {
        Self {
            instance: target.instance.name().to_string(),
            engine: target.instance.engine().to_string(),
            archive: target.uri(),
            state: SyncState::Idle,
            counts: SyncCounts::default(),
            failed_copies: Vec::new(),
            error: None,
        }
    }

    pub fn status(&self) -> InstanceStatus {
        if self.state == SyncState::Failed {
            InstanceStatus::Failed
        } else if self.counts.failed == 0 {
            InstanceStatus::Synced
        } else if self.counts.copied > 0 {
            InstanceStatus::Partial
        } else {
            InstanceStatus::CopyFailed
        }
    }
}

/// Tunables for an instance cycle.
#[derive(Clone, Copy, Debug)]
pub struct SyncSettings {
    pub listing_retry: RetryPolicy,
    pub copy_retry: RetryPolicy,
    pub copy_timeout: Duration,
    /// Copies in flight per instance; 1 copies strictly one after another.
    pub copy_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            listing_retry: RetryPolicy::default(),
            copy_retry: RetryPolicy::default(),
            copy_timeout: Duration::from_secs(300),
            copy_concurrency: 1,
        }
    }
}

/// Drives the `Idle → Listing → Diffing → Copying → Done` cycle for one
/// instance. Only listing or provisioning failures end in `Failed`; a failed
/// copy is recorded and the remaining files are still attempted.
#[derive(Clone)]
pub struct SyncOrchestrator {
    source_lister: Arc<dyn SourceLister>,
    provisioner: Arc<dyn DestinationProvisioner>,
    archive_lister: Arc<dyn ArchiveLister>,
    copier: Copier,
    listing_retry: RetryPolicy,
    copy_concurrency: usize,
    observer: Arc<dyn SyncObserver>,
}

impl SyncOrchestrator {
    pub fn new(
        backends: &Backends,
        settings: SyncSettings,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            source_lister: backends.source_lister.clone(),
            provisioner: backends.provisioner.clone(),
            archive_lister: backends.archive_lister.clone(),
            copier: Copier::new(
                backends.reader.clone(),
                backends.writer.clone(),
                settings.copy_retry,
                settings.copy_timeout,
            ),
            listing_retry: settings.listing_retry,
            copy_concurrency: settings.copy_concurrency.max(1),
            observer,
        }
    }

    /// Run one full cycle for `target`. Never fails: the outcome carries
    /// whatever went wrong.
    pub async fn sync(&self, target: &SyncTarget) -> InstanceOutcome {
        let mut outcome = InstanceOutcome::new(target);
        self.observer.instance_started(target);

        match self.run_cycle(target, &mut outcome).await {
            Ok(()) => self.transition(target, &mut outcome, SyncState::Done),
            Err(err) => {
                outcome.error = Some(err);
                self.transition(target, &mut outcome, SyncState::Failed);
            }
        }

        self.observer.instance_finished(&outcome);
        outcome
    }

    async fn run_cycle(
        &self,
        target: &SyncTarget,
        outcome: &mut InstanceOutcome,
    ) -> Result<(), DiscoveryError> {
        self.transition(target, outcome, SyncState::Listing);
        self.listing_retry
            .run("provisioning archive", || self.provisioner.ensure(target))
            .await?;
        let archived = self
            .listing_retry
            .run("listing archive", || self.archive_lister.list(target))
            .await?;
        let available = self
            .listing_retry
            .run("listing source", || self.source_lister.list(&target.instance))
            .await?;
        outcome.counts.archive_files = archived.len();
        outcome.counts.source_files = available.len();
        self.observer.listed(target, available.len(), archived.len());

        self.transition(target, outcome, SyncState::Diffing);
        let copy_set = delta::compute(&available, &archived);
        outcome.counts.selected = copy_set.len();
        self.observer.copy_set_computed(target, &copy_set);

        self.transition(target, outcome, SyncState::Copying);
        let results = self.copy_all(target, &copy_set).await;
        for (file, result) in copy_set.into_iter().zip(results) {
            match result {
                Ok(bytes) => {
                    outcome.counts.copied += 1;
                    outcome.counts.bytes_copied += bytes;
                }
                Err(error) => {
                    outcome.counts.failed += 1;
                    outcome.failed_copies.push(FailedCopy {
                        name: file.name,
                        error,
                    });
                }
            }
        }

        Ok(())
    }

    /// Copy every file, at most `copy_concurrency` at a time, returning results
    /// in copy-set order.
    async fn copy_all(
        &self,
        target: &SyncTarget,
        files: &[LogFile],
    ) -> Vec<Result<u64, CopyError>> {
        stream::iter(files)
            .map(|file| self.copy_one(target, file))
            .buffered(self.copy_concurrency)
            .collect()
            .await
    }

    async fn copy_one(&self, target: &SyncTarget, file: &LogFile) -> Result<u64, CopyError> {
        self.observer.copy_started(target, file);
        let result = self.copier.copy(file, &target.instance, target).await;
        self.observer.copy_finished(target, file, &result);
        result
    }

    fn transition(&self, target: &SyncTarget, outcome: &mut InstanceOutcome, to: SyncState) {
        let from = outcome.state;
        outcome.state = to;
        self.observer.state_changed(target, from, to);
    }
}
