pub mod arr;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod governor;
pub mod metrics;
pub mod monitor;
pub mod requests;
pub mod runtime;
pub mod search;
pub mod testing;
pub mod torrent_client;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, validate_instance, Config, ConfigError,
    SanitizedConfig,
};
pub use runtime::{CycleKind, RuntimeContext, RuntimeHandle};
pub use worker::{InstanceWorker, Supervisor, SupervisorStatus, WorkerError, WorkerStatus};
