//! Search scheduler: finds missing media in the catalog and dispatches
//! rate-limited searches to the owning back-end.

mod cooldown;
mod ordering;
mod scheduler;
mod types;

pub use cooldown::CooldownTracker;
pub use ordering::{request_candidates, select_candidates};
pub use scheduler::SearchScheduler;
pub use types::*;
