//! Value types shared by the listers, the copier and the orchestrator.
//!
//! `LogFile` describes one log file on either side of the sync, `DatabaseInstance`
//! is a discovered source, and `SyncTarget` is the archive namespace derived for it.

pub mod instance;
pub mod log_file;
pub mod target;

pub use instance::DatabaseInstance;
pub use log_file::LogFile;
pub use target::SyncTarget;
