//! Archive namespace for one instance.

use crate::{errors::ConfigError, models::instance::DatabaseInstance};
use std::collections::HashMap;

/// Where one instance's logs are archived: `s3://{bucket}/{root}/{instance}/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTarget {
    pub bucket: String,
    /// Always ends with `/`, never starts with one.
    pub prefix: String,
    pub instance: DatabaseInstance,
}

impl SyncTarget {
    /// Derive the target for `instance` under `root_prefix` in `bucket`.
    pub fn new(
        bucket: &str,
        root_prefix: &str,
        instance: DatabaseInstance,
    ) -> Result<Self, ConfigError> {
        if bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        let root = root_prefix.trim_matches('/');
        if root.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: format!("{}/{}/", root, instance.name()),
            instance,
        })
    }

    /// Object key for a log file name.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Recover a log file name from an object key, if the key lies under this
    /// target and is not the bare prefix.
    pub fn name_for<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Derive targets for all instances, rejecting any two that would share a prefix.
pub fn derive_targets(
    bucket: &str,
    root_prefix: &str,
    instances: Vec<DatabaseInstance>,
) -> Result<Vec<SyncTarget>, ConfigError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut targets = Vec::with_capacity(instances.len());
    for instance in instances {
        let target = SyncTarget::new(bucket, root_prefix, instance)?;
        if let Some(existing) = seen.insert(target.prefix.clone(), target.instance.name().into())
        {
            return Err(ConfigError::PrefixCollision(existing, target.prefix));
        }
        targets.push(target);
    }
    Ok(targets)
}
