//! Runtime context: connectivity gate, shutdown flag and single-flight registry.

mod connectivity;
mod context;
mod single_flight;

pub use connectivity::{probe_targets, spawn_connectivity_monitor};
pub use context::{RuntimeContext, RuntimeHandle};
pub use single_flight::{CycleKind, FlightGuard, SingleFlight};
