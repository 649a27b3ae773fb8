//! The sync pipeline: copy-set computation, per-file copy, per-instance
//! orchestration and the run driver that ties them together.

pub mod copier;
pub mod delta;
pub mod driver;
pub mod orchestrator;
pub mod retry;
