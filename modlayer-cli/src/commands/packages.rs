//! `modlayer packages` / `import` / `uninstall`.

use std::path::PathBuf;

use modlayer::deploy::DeployResult;
use modlayer::package::PackageId;
use modlayer::store::StateDir;

use super::start_service;

pub async fn list(state: &StateDir) -> DeployResult<()> {
    let service = start_service(state)?;
    let status = service.status().await?;
    service.shutdown().await;

    if status.packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }
    for package in &status.packages {
        println!(
            "{}  {}  {}",
            package.id,
            if package.enabled { "enabled" } else { "disabled" },
            package.name
        );
    }
    Ok(())
}

pub async fn import(state: &StateDir, path: PathBuf, name: Option<String>) -> DeployResult<()> {
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string())
    });

    let service = start_service(state)?;
    let package = service.import(path, name).await?;
    service.shutdown().await;

    println!("Imported {} as {}", package.name, package.id);
    Ok(())
}

pub async fn uninstall(state: &StateDir, id: &str) -> DeployResult<()> {
    let service = start_service(state)?;
    service.uninstall(PackageId::new(id)).await?;
    service.shutdown().await;

    println!("Uninstalled {}", id);
    Ok(())
}
