//! `modlayer status` - settings, mode and per-package state.

use console::style;
use modlayer::deploy::DeployResult;
use modlayer::store::StateDir;

use super::start_service;

pub async fn run(state: &StateDir) -> DeployResult<()> {
    let service = start_service(state)?;
    let status = service.status().await?;
    service.shutdown().await;

    println!("{}", style("Deployment").bold());
    match &status.settings.target_dir {
        Some(target) => println!("  target:  {}", target.display()),
        None => println!(
            "  target:  {} (set one with `modlayer config --target <DIR>`)",
            style("not configured").yellow()
        ),
    }
    println!("  mode:    {}", status.settings.mode);
    println!(
        "  sandbox: {}",
        if status.settings.sandbox { "on" } else { "off" }
    );
    println!("  tracked paths: {}", status.tracked_paths);

    println!();
    println!("{}", style("Packages").bold());
    if status.packages.is_empty() {
        println!("  (none installed)");
    }
    for package in &status.packages {
        let marker = if package.enabled {
            style("enabled ").green()
        } else {
            style("disabled").dim()
        };
        println!("  [{}] {} ({})", marker, package.name, package.id);
    }
    Ok(())
}
