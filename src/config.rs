use crate::{
    errors::ConfigError,
    services::{driver::RunPlan, orchestrator::SyncSettings, retry::RetryPolicy},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub s3_dst_bucket: String,
    pub s3_prefix_for_logs: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub archive_dir: Option<PathBuf>,
    pub instances: Vec<String>,
    pub copy_attempts: u32,
    pub retry_backoff_ms: u64,
    pub copy_timeout_secs: u64,
    pub copy_concurrency: usize,
    pub instance_concurrency: usize,
    pub log_level: String,
    pub json_summary: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Mirror new RDS database log files into S3"
)]
pub struct Args {
    /// Destination bucket (overrides RDS_LOG_DOG_S3_BUCKET)
    #[arg(long)]
    pub s3_dst_bucket: Option<String>,

    /// Root prefix for archived logs (overrides RDS_LOG_DOG_S3_PREFIX)
    #[arg(long)]
    pub s3_prefix_for_logs: Option<String>,

    /// AWS region (overrides RDS_LOG_DOG_REGION, then the SDK default chain)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO (overrides RDS_LOG_DOG_S3_ENDPOINT)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Archive into this local directory instead of S3 (overrides RDS_LOG_DOG_ARCHIVE_DIR)
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Only sync these instances; repeatable or comma-separated (overrides RDS_LOG_DOG_INSTANCES)
    #[arg(long = "instance", value_delimiter = ',')]
    pub instances: Vec<String>,

    /// Attempts per listing and per file copy (overrides RDS_LOG_DOG_COPY_ATTEMPTS)
    #[arg(long)]
    pub copy_attempts: Option<u32>,

    /// Pause between attempts in milliseconds (overrides RDS_LOG_DOG_RETRY_BACKOFF_MS)
    #[arg(long)]
    pub retry_backoff_ms: Option<u64>,

    /// Timeout for a single copy attempt in seconds (overrides RDS_LOG_DOG_COPY_TIMEOUT_SECS)
    #[arg(long)]
    pub copy_timeout_secs: Option<u64>,

    /// Files copied in parallel per instance (overrides RDS_LOG_DOG_COPY_CONCURRENCY)
    #[arg(long)]
    pub copy_concurrency: Option<usize>,

    /// Instances processed in parallel (overrides RDS_LOG_DOG_INSTANCE_CONCURRENCY)
    #[arg(long)]
    pub instance_concurrency: Option<usize>,

    /// Log level when RUST_LOG is unset (overrides RDS_LOG_DOG_LOG_LEVEL)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json_summary: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed args over values looked up by `var`; CLI wins.
    pub fn merge(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let cfg = Self {
            s3_dst_bucket: args
                .s3_dst_bucket
                .or_else(|| var("RDS_LOG_DOG_S3_BUCKET"))
                .unwrap_or_default(),
            s3_prefix_for_logs: args
                .s3_prefix_for_logs
                .or_else(|| var("RDS_LOG_DOG_S3_PREFIX"))
                .unwrap_or_else(|| "rds_logs".into()),
            region: args.region.or_else(|| var("RDS_LOG_DOG_REGION")),
            endpoint_url: args.endpoint_url.or_else(|| var("RDS_LOG_DOG_S3_ENDPOINT")),
            archive_dir: args
                .archive_dir
                .or_else(|| var("RDS_LOG_DOG_ARCHIVE_DIR").map(PathBuf::from)),
            instances: if args.instances.is_empty() {
                var("RDS_LOG_DOG_INSTANCES")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                args.instances
            },
            copy_attempts: pick(args.copy_attempts, &var, "RDS_LOG_DOG_COPY_ATTEMPTS", 3)?,
            retry_backoff_ms: pick(
                args.retry_backoff_ms,
                &var,
                "RDS_LOG_DOG_RETRY_BACKOFF_MS",
                500,
            )?,
            copy_timeout_secs: pick(
                args.copy_timeout_secs,
                &var,
                "RDS_LOG_DOG_COPY_TIMEOUT_SECS",
                300,
            )?,
            copy_concurrency: pick(
                args.copy_concurrency,
                &var,
                "RDS_LOG_DOG_COPY_CONCURRENCY",
                1,
            )?,
            instance_concurrency: pick(
                args.instance_concurrency,
                &var,
                "RDS_LOG_DOG_INSTANCE_CONCURRENCY",
                1,
            )?,
            log_level: args
                .log_level
                .or_else(|| var("RDS_LOG_DOG_LOG_LEVEL"))
                .unwrap_or_else(|| "info".into()),
            json_summary: args.json_summary,
        };

        Ok(cfg)
    }

    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_dst_bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if self.s3_prefix_for_logs.trim_matches('/').trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        for (name, value) in [
            ("copy_attempts", self.copy_attempts as u64),
            ("copy_timeout_secs", self.copy_timeout_secs),
            ("copy_concurrency", self.copy_concurrency as u64),
            ("instance_concurrency", self.instance_concurrency as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let retry = RetryPolicy::new(
            self.copy_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        );
        SyncSettings {
            listing_retry: retry,
            copy_retry: retry,
            copy_timeout: Duration::from_secs(self.copy_timeout_secs),
            copy_concurrency: self.copy_concurrency,
        }
    }

    pub fn run_plan(&self) -> RunPlan {
        RunPlan {
            bucket: self.s3_dst_bucket.clone(),
            root_prefix: self.s3_prefix_for_logs.clone(),
            only_instances: self.instances.clone(),
            instance_concurrency: self.instance_concurrency,
        }
    }
}

/// CLI value, else parsed env value, else `default`.
fn pick<T>(
    cli: Option<T>,
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = AppConfig::merge(Args::default(), env_of(&[])).unwrap();
        assert_eq!(cfg.s3_prefix_for_logs, "rds_logs");
        assert_eq!(cfg.copy_attempts, 3);
        assert_eq!(cfg.copy_concurrency, 1);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyBucket));
    }

    #[test]
    fn cli_overrides_environment() {
        let args = Args {
            s3_dst_bucket: Some("cli-bucket".into()),
            copy_attempts: Some(5),
            ..Args::default()
        };
        let cfg = AppConfig::merge(
            args,
            env_of(&[
                ("RDS_LOG_DOG_S3_BUCKET", "env-bucket"),
                ("RDS_LOG_DOG_S3_PREFIX", "archive"),
                ("RDS_LOG_DOG_COPY_ATTEMPTS", "2"),
                ("RDS_LOG_DOG_INSTANCES", "db1, db2,"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.s3_dst_bucket, "cli-bucket");
        assert_eq!(cfg.s3_prefix_for_logs, "archive");
        assert_eq!(cfg.copy_attempts, 5);
        assert_eq!(cfg.instances, vec!["db1", "db2"]);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = AppConfig::merge(
            Args::default(),
            env_of(&[("RDS_LOG_DOG_COPY_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("RDS_LOG_DOG_COPY_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_blank_prefix_and_zero_limits() {
        let base = AppConfig::merge(
            Args::default(),
            env_of(&[("RDS_LOG_DOG_S3_BUCKET", "b")]),
        )
        .unwrap();

        let blank_prefix = AppConfig {
            s3_prefix_for_logs: "/".into(),
            ..base.clone()
        };
        assert_eq!(blank_prefix.validate(), Err(ConfigError::EmptyPrefix));

        let no_parallelism = AppConfig {
            instance_concurrency: 0,
            ..base
        };
        assert_eq!(
            no_parallelism.validate(),
            Err(ConfigError::OutOfRange {
                name: "instance_concurrency",
                value: 0
            })
        );
    }

    #[test]
    fn settings_follow_config() {
        let cfg = AppConfig::merge(
            Args {
                s3_dst_bucket: Some("b".into()),
                retry_backoff_ms: Some(0),
                copy_timeout_secs: Some(9),
                ..Args::default()
            },
            env_of(&[]),
        )
        .unwrap();
        let settings = cfg.sync_settings();
        assert_eq!(settings.copy_retry, RetryPolicy::new(3, Duration::ZERO));
        assert_eq!(settings.copy_timeout, Duration::from_secs(9));
        assert_eq!(cfg.run_plan().root_prefix, "rds_logs");
    }
}
