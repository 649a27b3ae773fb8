//! A managed database instance discovered at the start of a run.

use crate::errors::ConfigError;
use serde::Serialize;
use std::fmt;

/// Engine assumed when discovery does not report one.
pub const DEFAULT_ENGINE: &str = "mysql";

/// A source database instance.
///
/// `name` joins the source namespace to the archive namespace, so it must be
/// non-empty, must not contain `/` and must not be `.` or `..`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DatabaseInstance {
    name: String,
    engine: String,
}

impl DatabaseInstance {
    /// Create an instance with the default engine.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_engine(name, DEFAULT_ENGINE)
    }

    pub fn with_engine(
        name: impl Into<String>,
        engine: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyInstanceName);
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(ConfigError::MalformedInstanceName(name));
        }
        let engine = engine.into();
        let engine = if engine.trim().is_empty() {
            DEFAULT_ENGINE.to_string()
        } else {
            engine
        };
        Ok(Self { name, engine })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }
}

impl fmt::Display for DatabaseInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.engine)
    }
}
