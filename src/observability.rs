//! Logging setup and the observer that carries progress out of the core.
//!
//! The orchestrator and driver never log through globals they configure
//! themselves; they report to a `SyncObserver` handed to them at construction.
//! `TracingObserver` turns those reports into `tracing` events.

use crate::{
    errors::CopyError,
    models::{LogFile, SyncTarget},
    services::{
        driver::RunSummary,
        orchestrator::{InstanceOutcome, InstanceStatus, SyncState},
    },
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Crates whose chatter is capped at `warn` unless `RUST_LOG` says otherwise.
const NOISY_CRATES: [&str; 6] = [
    "aws_config",
    "aws_smithy_runtime",
    "aws_sdk_rds",
    "aws_sdk_s3",
    "hyper",
    "rustls",
];

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `level` applies to everything except
/// the SDK/HTTP crates. Safe to call more than once: later calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![level.to_string()];
        directives.extend(NOISY_CRATES.iter().map(|c| format!("{}=warn", c)));
        EnvFilter::new(directives.join(","))
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Receives progress from a run. Every method defaults to doing nothing.
pub trait SyncObserver: Send + Sync {
    fn run_started(&self, _instances: usize) {}

    fn instance_started(&self, _target: &SyncTarget) {}

    fn state_changed(&self, _target: &SyncTarget, _from: SyncState, _to: SyncState) {}

    fn listed(&self, _target: &SyncTarget, _source_files: usize, _archive_files: usize) {}

    fn copy_set_computed(&self, _target: &SyncTarget, _copy_set: &[LogFile]) {}

    fn copy_started(&self, _target: &SyncTarget, _file: &LogFile) {}

    fn copy_finished(
        &self,
        _target: &SyncTarget,
        _file: &LogFile,
        _result: &Result<u64, CopyError>,
    ) {
    }

    fn instance_finished(&self, _outcome: &InstanceOutcome) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Reports progress as structured `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn run_started(&self, instances: usize) {
        info!("{} instances discovered.", instances);
    }

    fn instance_started(&self, target: &SyncTarget) {
        info!(
            instance = target.instance.name(),
            engine = target.instance.engine(),
            "processing rds-instance: '{}'",
            target.instance.name()
        );
    }

    fn state_changed(&self, target: &SyncTarget, from: SyncState, to: SyncState) {
        debug!(instance = target.instance.name(), ?from, ?to, "state change");
    }

    fn listed(&self, target: &SyncTarget, source_files: usize, archive_files: usize) {
        debug!("found {} files in {}", archive_files, target.uri());
        debug!("found {} files in {}", source_files, target.instance.name());
    }

    fn copy_set_computed(&self, target: &SyncTarget, copy_set: &[LogFile]) {
        info!(
            instance = target.instance.name(),
            "going to copy {} new logfiles ...",
            copy_set.len()
        );
    }

    fn copy_started(&self, target: &SyncTarget, file: &LogFile) {
        info!(
            instance = target.instance.name(),
            "copying '{}' ({}) ...",
            file.name,
            file.size
        );
    }

    fn copy_finished(
        &self,
        target: &SyncTarget,
        file: &LogFile,
        result: &Result<u64, CopyError>,
    ) {
        if let Err(err) = result {
            warn!(
                instance = target.instance.name(),
                file = %file.name,
                "copy failed: {}",
                err
            );
        }
    }

    fn instance_finished(&self, outcome: &InstanceOutcome) {
        let counts = &outcome.counts;
        match outcome.status() {
            InstanceStatus::Synced => info!(
                instance = %outcome.instance,
                source_files = counts.source_files,
                archive_files = counts.archive_files,
                selected = counts.selected,
                copied = counts.copied,
                "synced {} files for '{}'",
                counts.copied,
                outcome.instance
            ),
            InstanceStatus::Partial | InstanceStatus::CopyFailed => warn!(
                instance = %outcome.instance,
                selected = counts.selected,
                copied = counts.copied,
                failed = counts.failed,
                "synced {} of {} files for '{}'",
                counts.copied,
                counts.selected,
                outcome.instance
            ),
            InstanceStatus::Failed => error!(
                instance = %outcome.instance,
                "sync failed for '{}': {}",
                outcome.instance,
                outcome
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ),
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        info!(
            instances = summary.instances_processed,
            failed = summary.instances_failed,
            degraded = summary.instances_degraded,
            files_copied = summary.files_copied,
            files_failed = summary.files_failed,
            "run finished: {:?}",
            summary.status()
        );
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Remembers what it was told, for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        states: Mutex<Vec<SyncState>>,
        listed: Mutex<Vec<(String, usize, usize)>>,
        copies: Mutex<Vec<(String, bool)>>,
        finished: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub fn states(&self) -> Vec<SyncState> {
            self.states.lock().unwrap().clone()
        }

        pub fn listed(&self) -> Vec<(String, usize, usize)> {
            self.listed.lock().unwrap().clone()
        }

        pub fn copies(&self) -> Vec<(String, bool)> {
            self.copies.lock().unwrap().clone()
        }

        pub fn finished(&self) -> Vec<String> {
            self.finished.lock().unwrap().clone()
        }
    }

    impl SyncObserver for RecordingObserver {
        fn state_changed(&self, _target: &SyncTarget, _from: SyncState, to: SyncState) {
            self.states.lock().unwrap().push(to);
        }

        fn listed(&self, target: &SyncTarget, source_files: usize, archive_files: usize) {
            self.listed.lock().unwrap().push((
                target.instance.name().to_string(),
                source_files,
                archive_files,
            ));
        }

        fn copy_finished(
            &self,
            _target: &SyncTarget,
            file: &LogFile,
            result: &Result<u64, CopyError>,
        ) {
            self.copies
                .lock()
                .unwrap()
                .push((file.name.clone(), result.is_ok()));
        }

        fn instance_finished(&self, outcome: &InstanceOutcome) {
            self.finished.lock().unwrap().push(outcome.instance.clone());
        }
    }

    #[test]
    fn logging_init_is_idempotent() {
        init_logging("debug");
        init_logging("info");
    }
}
