//! `modlayer enable` / `disable` / `refresh` / `check` / `priority`.

use console::style;
use dialoguer::{Confirm, Select};

use modlayer::deploy::{DeployResult, IntegrityReport, IntegrityResolution, PathFailure};
use modlayer::package::PackageId;
use modlayer::service::EnableOutcome;
use modlayer::store::StateDir;

use super::start_service;

pub async fn enable(
    state: &StateDir,
    id: &str,
    order: Option<Vec<String>>,
    assume_yes: bool,
) -> DeployResult<()> {
    let id = PackageId::new(id);
    let order_override =
        order.map(|ids| ids.into_iter().map(PackageId::new).collect::<Vec<_>>());

    let service = start_service(state)?;
    let plan = service.plan_enable(id.clone()).await?;

    // Integrity gate: the user decides what drift means.
    let on_modified = if plan.integrity.is_modified() {
        print_drift(&plan.integrity);
        if assume_yes {
            IntegrityResolution::Cancel
        } else {
            prompt_resolution()?
        }
    } else {
        IntegrityResolution::Cancel
    };

    // Conflict confirmation, unless the caller supplied an explicit order.
    if order_override.is_none() {
        if let Some(proposed) = &plan.proposed {
            println!(
                "{} {} conflicting package(s); proposed order (highest first):",
                style("Conflicts:").yellow(),
                proposed.order.len() - 1
            );
            for (index, member) in proposed.order.iter().enumerate() {
                println!("  {}. {}", index + 1, member);
            }
            if !assume_yes {
                let accepted = Confirm::new()
                    .with_prompt("Apply this order?")
                    .default(true)
                    .interact()
                    .unwrap_or(false);
                if !accepted {
                    println!("Aborted. Re-run with --order to set an explicit order.");
                    service.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    let outcome = service.enable(id, order_override, on_modified).await?;
    service.shutdown().await;

    match outcome {
        EnableOutcome::Enabled(report) => {
            println!(
                "Enabled: {} path(s) deployed, {} skipped",
                report.deployed, report.skipped
            );
            print_failures(&report.failures);
        }
        EnableOutcome::Cancelled(_) => {
            println!("Enable cancelled (package content drifted).");
        }
        EnableOutcome::Uninstalled(_) => {
            println!("Package uninstalled (content drifted).");
        }
    }
    Ok(())
}

pub async fn disable(state: &StateDir, id: &str) -> DeployResult<()> {
    let service = start_service(state)?;
    let report = service.disable(PackageId::new(id)).await?;
    service.shutdown().await;

    println!(
        "Disabled: {} path(s) restored, {} removed",
        report.restored, report.removed
    );
    print_failures(&report.failures);
    Ok(())
}

pub async fn refresh(state: &StateDir) -> DeployResult<()> {
    let service = start_service(state)?;
    let report = service.refresh().await?;
    service.shutdown().await;

    println!(
        "Refresh: {} path(s) examined, {} link(s) touched",
        report.examined,
        report.mutation_count()
    );
    print_failures(&report.failures);
    Ok(())
}

pub async fn check(state: &StateDir, id: &str) -> DeployResult<()> {
    let service = start_service(state)?;
    let report = service.check(PackageId::new(id)).await?;
    service.shutdown().await;

    if !report.is_modified() {
        println!("{} matches its recorded listing.", id);
    } else {
        print_drift(&report);
    }
    Ok(())
}

pub async fn priority(state: &StateDir, order: Vec<String>) -> DeployResult<()> {
    let order: Vec<PackageId> = order.into_iter().map(PackageId::new).collect();

    let service = start_service(state)?;
    let report = service.set_priority(order).await?;
    service.shutdown().await;

    println!(
        "Priority recorded; {} link(s) touched on refresh",
        report.mutation_count()
    );
    print_failures(&report.failures);
    Ok(())
}

fn prompt_resolution() -> DeployResult<IntegrityResolution> {
    let choice = Select::new()
        .with_prompt("Package content drifted from its recorded listing")
        .items(&[
            "Refresh the recorded listing and continue",
            "Uninstall the package",
            "Cancel",
        ])
        .default(2)
        .interact()
        .unwrap_or(2);
    Ok(match choice {
        0 => IntegrityResolution::RefreshManifest,
        1 => IntegrityResolution::Uninstall,
        _ => IntegrityResolution::Cancel,
    })
}

fn print_drift(report: &IntegrityReport) {
    println!("{}", style("Content drift detected:").yellow());
    for path in &report.missing {
        println!("  missing:    {}", path);
    }
    for path in &report.unrecorded {
        println!("  unrecorded: {}", path);
    }
}

fn print_failures(failures: &[PathFailure]) {
    for failure in failures {
        println!(
            "  {} {}: {}",
            style("failed").red(),
            failure.path,
            failure.reason
        );
    }
}
