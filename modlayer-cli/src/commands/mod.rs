//! Command implementations.

use std::path::PathBuf;

use modlayer::deploy::DeployResult;
use modlayer::service::{DeployService, ServiceConfig};
use modlayer::store::StateDir;

pub mod config;
pub mod deploy;
pub mod mode;
pub mod packages;
pub mod status;

/// Resolve the state directory from the CLI flag or the default location.
pub fn state_dir(explicit: Option<PathBuf>) -> StateDir {
    match explicit {
        Some(dir) => StateDir::new(dir),
        None => StateDir::default_location()
            .unwrap_or_else(|| StateDir::new(PathBuf::from(".modlayer"))),
    }
}

/// Start the deployment service for one command invocation.
pub fn start_service(state: &StateDir) -> DeployResult<DeployService> {
    DeployService::start(ServiceConfig::new(state.clone()))
}
