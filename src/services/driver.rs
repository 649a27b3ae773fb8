//! A run across every discovered instance.

use super::orchestrator::{InstanceOutcome, InstanceStatus, SyncOrchestrator};
use crate::{
    backends::InstanceDiscoverer,
    errors::{ConfigError, RunError},
    models::{DatabaseInstance, target::derive_targets},
    observability::SyncObserver,
};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every instance synced every selected file.
    Success,
    /// At least one instance failed or left files uncopied.
    Degraded,
}

/// Aggregate of one run, in discovery order.
#[derive(Serialize, Clone, Debug)]
pub struct RunSummary {
    pub instances_processed: usize,
    pub instances_failed: usize,
    /// Instances that listed fine but failed some or all copies.
    pub instances_degraded: usize,
    pub files_copied: usize,
    pub files_failed: usize,
    pub outcomes: Vec<InstanceOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: Vec<InstanceOutcome>) -> Self {
        let count = |wanted: &[InstanceStatus]| {
            outcomes
                .iter()
                .filter(|o| wanted.contains(&o.status()))
                .count()
        };
        Self {
            instances_processed: outcomes.len(),
            instances_failed: count(&[InstanceStatus::Failed]),
            instances_degraded: count(&[InstanceStatus::Partial, InstanceStatus::CopyFailed]),
            files_copied: outcomes.iter().map(|o| o.counts.copied).sum(),
            files_failed: outcomes.iter().map(|o| o.counts.failed).sum(),
            outcomes,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.instances_failed == 0 && self.instances_degraded == 0 {
            RunStatus::Success
        } else {
            RunStatus::Degraded
        }
    }
}

/// Where archives go and which instances to include.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub bucket: String,
    pub root_prefix: String,
    /// Instance names to process; empty means all discovered instances.
    pub only_instances: Vec<String>,
    /// Instances in flight at once; 1 processes them one after another.
    pub instance_concurrency: usize,
}

pub struct RunDriver {
    discoverer: Arc<dyn InstanceDiscoverer>,
    orchestrator: SyncOrchestrator,
    plan: RunPlan,
    observer: Arc<dyn SyncObserver>,
}

impl RunDriver {
    pub fn new(
        discoverer: Arc<dyn InstanceDiscoverer>,
        orchestrator: SyncOrchestrator,
        plan: RunPlan,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            discoverer,
            orchestrator,
            plan,
            observer,
        }
    }

    /// Discover instances, validate their archive targets, then sync each.
    ///
    /// Only a discovery failure or an invalid target aborts the run; every
    /// per-instance problem is carried in the returned summary.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let discovered = self.discoverer.discover().await.map_err(|e| {
            // invalid instance identity surfaces as configuration
            match e.downcast_ref::<ConfigError>() {
                Some(config) => RunError::Config(config.clone()),
                None => RunError::Discovery(format!("{:#}", e)),
            }
        })?;
        let instances = self.select(discovered);
        self.observer.run_started(instances.len());

        let targets = derive_targets(&self.plan.bucket, &self.plan.root_prefix, instances)?;

        let outcomes: Vec<InstanceOutcome> = stream::iter(&targets)
            .map(|target| self.orchestrator.sync(target))
            .buffered(self.plan.instance_concurrency.max(1))
            .collect()
            .await;

        let summary = RunSummary::from_outcomes(outcomes);
        self.observer.run_finished(&summary);
        Ok(summary)
    }

    fn select(&self, discovered: Vec<DatabaseInstance>) -> Vec<DatabaseInstance> {
        if self.plan.only_instances.is_empty() {
            return discovered;
        }
        for wanted in &self.plan.only_instances {
            if !discovered.iter().any(|i| i.name() == wanted) {
                warn!("instance '{}' was requested but not discovered", wanted);
            }
        }
        discovered
            .into_iter()
            .filter(|i| self.plan.only_instances.iter().any(|w| w == i.name()))
            .collect()
    }
}
