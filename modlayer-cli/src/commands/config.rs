//! `modlayer config` - show or change deployment settings.

use std::path::PathBuf;

use modlayer::deploy::{DeployError, DeployResult};
use modlayer::store::{DeploymentSettings, StateDir};

pub async fn run(
    state: &StateDir,
    target: Option<PathBuf>,
    sandbox: Option<String>,
) -> DeployResult<()> {
    state
        .ensure()
        .map_err(|e| DeployError::create_dir(state.root(), e))?;
    let mut settings = DeploymentSettings::load(&state.config_file())?;

    let mut changed = false;
    if let Some(target) = target {
        settings.target_dir = Some(target);
        changed = true;
    }
    if let Some(sandbox) = sandbox {
        settings.sandbox = sandbox == "on";
        changed = true;
    }
    if changed {
        settings.save(&state.config_file())?;
    }

    match &settings.target_dir {
        Some(target) => println!("target:  {}", target.display()),
        None => println!("target:  (not configured)"),
    }
    println!("mode:    {}", settings.mode);
    println!("sandbox: {}", if settings.sandbox { "on" } else { "off" });
    Ok(())
}
