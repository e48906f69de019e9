//! File filtering - exclusion rules, extension allow-list and media probe.

mod engine;
mod probe;
mod types;

pub use engine::FilterEngine;
pub use probe::{FfprobeProbe, MediaProbe, NoProbe};
pub use types::*;
