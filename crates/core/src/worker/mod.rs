//! Per-instance workers and their supervisor.

mod instance;
mod supervisor;
mod types;

pub use instance::{InstanceWorker, WorkerDeps};
pub use supervisor::Supervisor;
pub use types::*;
