//! Request feeds (Overseerr, Ombi).
//!
//! Requested media is matched against the catalog by external id and
//! searched ahead of the regular sweep.

mod ombi;
mod overseerr;
mod types;

use std::sync::Arc;
use std::time::Duration;

pub use ombi::OmbiClient;
pub use overseerr::OverseerrClient;
pub use types::*;

use crate::config::InstanceConfig;

/// Build the request services configured for an instance.
pub fn services_for(
    instance: &InstanceConfig,
) -> Result<Vec<Arc<dyn RequestService>>, RequestError> {
    let timeout = Duration::from_secs(instance.timeout_secs);
    let mut services: Vec<Arc<dyn RequestService>> = Vec::new();
    if let Some(config) = &instance.search.overseerr {
        services.push(Arc::new(OverseerrClient::new(config, timeout)?));
    }
    if let Some(config) = &instance.search.ombi {
        services.push(Arc::new(OmbiClient::new(config, timeout)?));
    }
    Ok(services)
}
