//! Small filesystem helpers shared by the deployment strategies.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::package::{ContentPath, OVERLAY_MARKER};
use crate::platform;

use super::error::{DeployError, DeployResult};

/// Copy one file, creating parent directories as needed.
pub(super) fn copy_file(source: &Path, dest: &Path) -> DeployResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| DeployError::create_dir(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            DeployError::ReadFailed {
                path: source.to_path_buf(),
                source: e,
            }
        } else {
            DeployError::write(dest, e)
        }
    })?;
    Ok(())
}

/// Remove now-empty parent directories between a deleted file and a root.
/// Stops at the first non-empty directory.
pub(super) fn prune_empty_dirs(removed_file: &Path, root: &Path) {
    let mut dir = removed_file.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Collect every symlink under `root`, keyed by its relative content path.
///
/// Regular files are ignored; directories are descended into without
/// following links.
pub(super) fn collect_links(root: &Path) -> DeployResult<Vec<(ContentPath, PathBuf)>> {
    let mut links = Vec::new();
    if root.is_dir() {
        collect_links_walk(root, root, &mut links)?;
    }
    Ok(links)
}

fn collect_links_walk(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(ContentPath, PathBuf)>,
) -> DeployResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| DeployError::read(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DeployError::read(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| DeployError::read(&path, e))?;

        if file_type.is_symlink() {
            let rel = path.strip_prefix(root).expect("walk stays under root");
            if let Some(content_path) = ContentPath::from_rel(rel) {
                out.push((content_path, path));
            }
        } else if file_type.is_dir() {
            collect_links_walk(root, &path, out)?;
        }
    }
    Ok(())
}

/// Create the overlay folder and its marker file if absent.
///
/// The marker is what later allows destructive cleanup to prove the folder
/// is modlayer-managed.
pub(super) fn ensure_overlay_root(overlay_dir: &Path) -> DeployResult<()> {
    fs::create_dir_all(overlay_dir).map_err(|e| DeployError::create_dir(overlay_dir, e))?;
    let marker = overlay_dir.join(OVERLAY_MARKER);
    if !marker.exists() {
        fs::write(&marker, "managed by modlayer\n").map_err(|e| DeployError::write(&marker, e))?;
    }
    Ok(())
}

pub(super) enum LinkAction {
    Created,
    Replaced,
    Unchanged,
}

/// Make `link` a symlink to `source`, doing nothing when it already is.
///
/// A regular file at the link path is a collision and is never touched.
pub(super) fn ensure_link(link: &Path, source: &Path) -> DeployResult<LinkAction> {
    match fs::symlink_metadata(link) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent).map_err(|e| DeployError::create_dir(parent, e))?;
            }
            make_link(source, link)?;
            Ok(LinkAction::Created)
        }
        Err(e) => Err(DeployError::read(link, e)),
        Ok(meta) if meta.file_type().is_symlink() => {
            let current = fs::read_link(link).map_err(|e| DeployError::read(link, e))?;
            if current == source {
                return Ok(LinkAction::Unchanged);
            }
            fs::remove_file(link).map_err(|e| DeployError::write(link, e))?;
            make_link(source, link)?;
            Ok(LinkAction::Replaced)
        }
        Ok(_) => Err(DeployError::TargetCollision {
            path: link.to_path_buf(),
            reason: "expected a symlink, found a regular file".to_string(),
        }),
    }
}

pub(super) fn make_link(source: &Path, link: &Path) -> DeployResult<()> {
    platform::symlink_file(source, link).map_err(|e| {
        if platform::is_permission_denied(&e) {
            DeployError::PermissionDenied {
                path: link.to_path_buf(),
                source: e,
            }
        } else {
            DeployError::SymlinkFailed {
                source: source.to_path_buf(),
                target: link.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })
}
