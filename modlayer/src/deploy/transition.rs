//! One-time mode transitions between a plain target tree and the
//! junction-backed overlay.
//!
//! # Setup (plain → overlay)
//!
//! 1. Rename the target directory to its hidden alias (the name with a
//!    trailing space), parking the original files untouched.
//! 2. Populate the overlay folder with one symlink per original file,
//!    skipping paths already linked — a partially-populated overlay from an
//!    earlier failed run resumes where it stopped.
//! 3. Create the directory junction at the target path.
//!
//! If step 3 fails after 1–2 succeeded, nothing is rolled back: the alias
//! and overlay stay in place and a retry only has to redo step 3. If the
//! rename in step 1 fails, nothing else is attempted.
//!
//! # Teardown (overlay → plain)
//!
//! 1. Remove the junction — the reparse point only, never its target's
//!    contents.
//! 2. Rename the hidden alias back; this fails if the public path already
//!    exists (for instance after an earlier incomplete teardown).
//! 3. Replace every symlink in the now-public tree with a physical copy of
//!    the file it references, so the target is self-contained. This pass is
//!    best-effort: failures are reported per path and never stop the walk.

use std::fs;
use std::io;
use std::path::Path;

use crate::package::{content_paths, OVERLAY_MARKER};
use crate::platform;

use super::error::{DeployError, DeployResult, PathFailure};
use super::util::{collect_links, copy_file, ensure_link, ensure_overlay_root};

/// Result of a teardown's link materialisation pass.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Links replaced by physical copies.
    pub materialized: usize,

    /// Paths that could not be materialised (the walk continued past each).
    pub failures: Vec<PathFailure>,
}

/// Convert a plain target directory into the junction-backed overlay form.
///
/// The caller must ensure no package is currently enabled. Idempotent: a
/// target that already is the overlay junction returns `Ok` immediately,
/// and a partially-completed earlier run is resumed.
pub fn setup_overlay_mode(
    target: &Path,
    overlay_dir: &Path,
    hidden_dir: &Path,
) -> DeployResult<()> {
    // Step 3 already done?
    if platform::is_link(target) {
        let actual = platform::link_target(target).map_err(|e| DeployError::read(target, e))?;
        if actual == overlay_dir {
            tracing::debug!(target = %target.display(), "Target is already the overlay junction");
            return Ok(());
        }
        return Err(DeployError::TargetCollision {
            path: target.to_path_buf(),
            reason: format!("links to unexpected location {}", actual.display()),
        });
    }

    // Step 1: park the original tree under the hidden alias.
    if hidden_dir.exists() {
        if target.exists() {
            // Both trees present: a fresh target appeared after an earlier
            // partial setup. Nothing safe to do automatically.
            return Err(DeployError::TargetCollision {
                path: target.to_path_buf(),
                reason: "both the target and its hidden alias exist".to_string(),
            });
        }
        tracing::info!(alias = %hidden_dir.display(), "Resuming setup from existing hidden alias");
    } else if target.exists() {
        fs::rename(target, hidden_dir).map_err(|source| DeployError::RenameFailed {
            from: target.to_path_buf(),
            to: hidden_dir.to_path_buf(),
            source,
        })?;
    } else {
        // No original tree to park; start from an empty alias.
        fs::create_dir_all(hidden_dir).map_err(|e| DeployError::create_dir(hidden_dir, e))?;
    }

    // Step 2: one link per original file, resumable.
    ensure_overlay_root(overlay_dir)?;
    let originals = content_paths(hidden_dir).map_err(|e| DeployError::read(hidden_dir, e))?;
    for entry in &originals {
        let source = entry.path.join_under(hidden_dir);
        let link = entry.path.join_under(overlay_dir);
        ensure_link(&link, &source)?;
    }

    // Step 3: the junction itself.
    platform::create_dir_link(overlay_dir, target).map_err(|e| {
        if platform::is_permission_denied(&e) {
            DeployError::PermissionDenied {
                path: target.to_path_buf(),
                source: e,
            }
        } else {
            DeployError::SymlinkFailed {
                source: overlay_dir.to_path_buf(),
                target: target.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    tracing::info!(
        target = %target.display(),
        overlay = %overlay_dir.display(),
        originals = originals.len(),
        "Overlay mode set up"
    );
    Ok(())
}

/// Convert the junction-backed target back into a plain, self-contained
/// directory tree.
pub fn teardown_overlay_mode(
    target: &Path,
    overlay_dir: &Path,
    hidden_dir: &Path,
) -> DeployResult<TeardownReport> {
    // Step 1: remove the reparse point.
    if platform::is_link(target) {
        let actual = platform::link_target(target).map_err(|e| DeployError::read(target, e))?;
        if actual != overlay_dir {
            return Err(DeployError::TargetCollision {
                path: target.to_path_buf(),
                reason: format!("links to unexpected location {}", actual.display()),
            });
        }
        platform::remove_dir_link(target).map_err(|e| DeployError::write(target, e))?;
    } else if target.exists() && hidden_dir.exists() {
        // The junction is gone but the alias was never renamed back; a new
        // public tree in the way makes the rename unsafe.
        return Err(DeployError::TargetCollision {
            path: target.to_path_buf(),
            reason: "public path already exists while the hidden alias is still present"
                .to_string(),
        });
    }

    // Step 2: bring the original tree back.
    if hidden_dir.exists() {
        fs::rename(hidden_dir, target).map_err(|source| DeployError::RenameFailed {
            from: hidden_dir.to_path_buf(),
            to: target.to_path_buf(),
            source,
        })?;
    } else if !target.is_dir() {
        return Err(DeployError::ReadFailed {
            path: hidden_dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::NotFound,
                "hidden alias missing and no target directory to restore",
            ),
        });
    }

    // Step 3: make the tree self-contained.
    let mut report = TeardownReport::default();
    for (path, link) in collect_links(target)? {
        match materialize_link(&link) {
            Ok(true) => report.materialized += 1,
            Ok(false) => {
                report.failures.push(PathFailure::new(
                    path,
                    "referenced file missing; dangling link removed".to_string(),
                ));
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to materialise link");
                report.failures.push(PathFailure::new(path, e.to_string()));
            }
        }
    }

    // The overlay folder only held links into the alias we just renamed;
    // remove it so a later setup starts clean.
    if let Err(e) = remove_overlay_folder(overlay_dir) {
        tracing::warn!(error = %e, "Could not remove the overlay folder after teardown");
    }

    tracing::info!(
        target = %target.display(),
        materialized = report.materialized,
        failed = report.failures.len(),
        "Overlay mode torn down"
    );
    Ok(report)
}

/// Replace one symlink with a physical copy of its referent.
///
/// Returns `Ok(false)` when the referent is gone: the dangling link is
/// removed so the restored tree never contains one.
fn materialize_link(link: &Path) -> DeployResult<bool> {
    let referent = fs::read_link(link).map_err(|e| DeployError::read(link, e))?;
    if !referent.is_file() {
        platform::remove_file_link(link).map_err(|e| DeployError::write(link, e))?;
        return Ok(false);
    }

    // Copy next to the link first so a failed copy never costs the link.
    let file_name = link
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("materialized");
    let tmp = link.with_file_name(format!(".{}.mltmp", file_name));
    copy_file(&referent, &tmp)?;

    if let Err(e) = platform::remove_file_link(link) {
        fs::remove_file(&tmp).ok();
        return Err(DeployError::write(link, e));
    }
    fs::rename(&tmp, link).map_err(|source| DeployError::RenameFailed {
        from: tmp.clone(),
        to: link.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Remove the overlay folder, but only when its marker proves modlayer
/// created it.
fn remove_overlay_folder(overlay_dir: &Path) -> DeployResult<bool> {
    if !overlay_dir.exists() {
        return Ok(false);
    }
    let marker = overlay_dir.join(OVERLAY_MARKER);
    if !marker.exists() {
        return Err(DeployError::TargetCollision {
            path: overlay_dir.to_path_buf(),
            reason: "overlay folder is missing its marker file, refusing to remove".to_string(),
        });
    }
    fs::remove_dir_all(overlay_dir).map_err(|e| DeployError::write(overlay_dir, e))?;
    Ok(true)
}
