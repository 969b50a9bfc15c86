//! `modlayer mode setup` / `teardown` - one-time target conversions.

use console::style;
use dialoguer::Confirm;

use modlayer::deploy::DeployResult;
use modlayer::store::StateDir;

use super::start_service;

pub async fn setup(state: &StateDir, assume_yes: bool) -> DeployResult<()> {
    if !assume_yes {
        println!(
            "This renames the target directory to a hidden alias and replaces it \
             with a junction into the overlay folder."
        );
        let confirmed = Confirm::new()
            .with_prompt("Convert the target to overlay mode?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let service = start_service(state)?;
    service.setup_overlay().await?;
    service.shutdown().await;

    println!("{}", style("Overlay mode is active.").green());
    Ok(())
}

pub async fn teardown(state: &StateDir) -> DeployResult<()> {
    let service = start_service(state)?;
    let report = service.teardown_overlay().await?;
    service.shutdown().await;

    println!(
        "Target restored to a plain tree; {} link(s) materialised.",
        report.materialized
    );
    for failure in &report.failures {
        println!(
            "  {} {}: {}",
            style("failed").red(),
            failure.path,
            failure.reason
        );
    }
    Ok(())
}
