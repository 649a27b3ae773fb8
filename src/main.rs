use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, SdkConfig};
use std::{process::ExitCode, sync::Arc};

mod backends;
mod config;
mod errors;
mod models;
mod observability;
mod services;

use backends::{Backends, local::LocalArchive, rds::RdsBackend, s3::S3Archive};
use observability::{SyncObserver, TracingObserver};
use services::{
    driver::{RunDriver, RunStatus},
    orchestrator::SyncOrchestrator,
};

/// Exit status when the run finished but some instance or file did not sync.
const EXIT_DEGRADED: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    observability::init_logging(&cfg.log_level);
    tracing::info!("rds-log-dog version: {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Running with config: {:?}", cfg);

    cfg.validate().context("invalid configuration")?;

    // --- Backends ---
    let aws = load_aws_config(cfg.region.clone()).await;
    let rds = Arc::new(RdsBackend::new(aws_sdk_rds::Client::new(&aws)));
    let backends = match &cfg.archive_dir {
        Some(dir) => {
            tracing::info!("Archiving into local directory {}", dir.display());
            Backends::new(rds.clone(), rds, Arc::new(LocalArchive::new(dir)))
        }
        None => {
            let mut s3_config = aws_sdk_s3::config::Builder::from(&aws);
            if let Some(endpoint) = &cfg.endpoint_url {
                s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
            }
            let s3 = aws_sdk_s3::Client::from_conf(s3_config.build());
            Backends::new(rds.clone(), rds, Arc::new(S3Archive::new(s3)))
        }
    };

    // --- Run ---
    let observer: Arc<dyn SyncObserver> = Arc::new(TracingObserver);
    let orchestrator = SyncOrchestrator::new(&backends, cfg.sync_settings(), observer.clone());
    let driver = RunDriver::new(
        backends.discoverer.clone(),
        orchestrator,
        cfg.run_plan(),
        observer,
    );
    let summary = driver.run().await?;

    if cfg.json_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(match summary.status() {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::Degraded => ExitCode::from(EXIT_DEGRADED),
    })
}

/// Load shared AWS settings from the environment, pinning the region if given.
async fn load_aws_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_sdk_s3::config::Region::new(region));
    }
    loader.load().await
}
