//! Direct-copy deployment.
//!
//! Package files are physically copied into the target directory. The
//! ownership stacks record who provided each path, so disabling a package
//! re-exposes the next owner's bytes. A pre-existing target file shadowed
//! by the first owner is parked under the originals directory and restored
//! byte-for-byte when the last owner leaves, mirroring the hidden-original
//! floor the overlay mode gets from its alias rename.
//!
//! Enable is atomic per call: if any copy fails the whole batch is rolled
//! back and the stack mutations are discarded. Disable is deliberately not:
//! every path is attempted independently, because leaving a package's
//! bookkeeping "still enabled" is worse than a partially-cleaned target.

use std::fs;
use std::io;
use std::path::Path;

use crate::package::{ContentEntry, ContentPath, Package, PackageId};

use super::error::{DeployError, DeployResult, PathFailure};
use super::util::{copy_file, prune_empty_dirs};
use super::{DeployContext, DeployStrategy, DisableReport, EnableReport, RefreshReport};

/// The direct-copy strategy.
pub struct DirectCopyStrategy;

/// What occupied a path before one enable call copied over it.
enum PriorState {
    /// Another package's file (top of a non-empty stack).
    Owned(PackageId),
    /// An unowned pre-existing file, parked under the originals directory.
    Parked,
    /// Nothing.
    Absent,
}

impl DeployStrategy for DirectCopyStrategy {
    fn enable(
        &self,
        ctx: &mut DeployContext<'_>,
        package: &Package,
        entries: &[ContentEntry],
    ) -> DeployResult<EnableReport> {
        let mut staged = ctx.ownership.clone();
        let mut completed: Vec<(ContentPath, PriorState)> = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0;

        for entry in entries {
            let prev_top = staged.top(&entry.path).cloned();
            if !staged.push(&entry.path, &package.id) {
                skipped += 1;
                continue;
            }

            let source = package.content_file(&entry.path);
            let dest = entry.path.join_under(ctx.target);

            let prior = match prev_top {
                Some(owner) => PriorState::Owned(owner),
                None if dest.is_file() => {
                    // First owner over a user-placed file: park the
                    // original so the last disable can restore it.
                    let parked = entry.path.join_under(ctx.originals_dir);
                    if let Err(e) = copy_file(&dest, &parked) {
                        failures.push(PathFailure::new(entry.path.clone(), e.to_string()));
                        continue;
                    }
                    PriorState::Parked
                }
                None => PriorState::Absent,
            };

            match copy_file(&source, &dest) {
                Ok(()) => completed.push((entry.path.clone(), prior)),
                Err(e) => failures.push(PathFailure::new(entry.path.clone(), e.to_string())),
            }
        }

        if failures.is_empty() {
            *ctx.ownership = staged;
            tracing::info!(
                id = %package.id,
                deployed = completed.len(),
                skipped,
                "Enabled package (direct copy)"
            );
            return Ok(EnableReport {
                deployed: completed.len(),
                skipped,
                failures: Vec::new(),
            });
        }

        // Revert every completed copy; the staged stacks are dropped.
        tracing::warn!(
            id = %package.id,
            failed = failures.len(),
            completed = completed.len(),
            "Enable failed, rolling back completed copies"
        );
        for (path, prior) in completed.iter().rev() {
            rollback_path(ctx, path, prior);
        }

        Err(DeployError::PartialFailure {
            operation: "enable",
            failures,
        })
    }

    fn disable(&self, ctx: &mut DeployContext<'_>, id: &PackageId) -> DeployResult<DisableReport> {
        // Paths come from the recorded stacks, never from re-walking the
        // package directory: it may already be deleted.
        let paths = ctx.ownership.paths_claimed_by(id);
        let mut report = DisableReport::default();

        for path in paths {
            ctx.ownership.pop(&path, id);
            let dest = path.join_under(ctx.target);

            loop {
                match ctx.ownership.top(&path).cloned() {
                    Some(top) => {
                        let source = ctx
                            .package_roots
                            .get(&top)
                            .map(|root| path.join_under(root));
                        match source {
                            Some(src) if src.is_file() => {
                                match copy_file(&src, &dest) {
                                    Ok(()) => report.restored += 1,
                                    Err(e) => report
                                        .failures
                                        .push(PathFailure::new(path.clone(), e.to_string())),
                                }
                                break;
                            }
                            _ => {
                                // The next owner's source is gone: prune its
                                // claim and fall through to whoever is below.
                                tracing::warn!(
                                    path = %path,
                                    owner = %top,
                                    "Next owner's source file is missing, pruning its claim"
                                );
                                report.failures.push(PathFailure::new(
                                    path.clone(),
                                    format!("source missing for {}, claim pruned", top),
                                ));
                                ctx.ownership.pop(&path, &top);
                            }
                        }
                    }
                    None => {
                        match restore_or_remove(ctx, &path, &dest) {
                            Ok(()) => report.removed += 1,
                            Err(e) => report
                                .failures
                                .push(PathFailure::new(path.clone(), e.to_string())),
                        }
                        break;
                    }
                }
            }
        }

        tracing::info!(
            id = %id,
            restored = report.restored,
            removed = report.removed,
            failed = report.failures.len(),
            "Disabled package (direct copy)"
        );
        Ok(report)
    }

    fn refresh(&self, _ctx: &mut DeployContext<'_>) -> DeployResult<RefreshReport> {
        // Nothing to reconcile: the target holds real files and every
        // mutation happens at enable/disable time.
        Ok(RefreshReport::default())
    }
}

/// Undo one completed copy from a failed enable call.
fn rollback_path(ctx: &DeployContext<'_>, path: &ContentPath, prior: &PriorState) {
    let dest = path.join_under(ctx.target);
    match prior {
        PriorState::Owned(owner) => {
            // The copy overwrote the previous owner's file; restore its
            // bytes rather than leaving our own behind.
            let restored = ctx
                .package_roots
                .get(owner)
                .map(|root| path.join_under(root))
                .map_or(false, |src| fs::copy(&src, &dest).is_ok());
            if !restored {
                tracing::error!(
                    path = %path,
                    owner = %owner,
                    "Rollback could not restore the previous owner's file"
                );
            }
        }
        PriorState::Parked => {
            let parked = path.join_under(ctx.originals_dir);
            if fs::copy(&parked, &dest).is_ok() {
                remove_quietly(&parked);
                prune_empty_dirs(&parked, ctx.originals_dir);
            } else {
                tracing::error!(path = %path, "Rollback could not restore the parked original");
            }
        }
        PriorState::Absent => {
            remove_quietly(&dest);
            prune_empty_dirs(&dest, ctx.target);
        }
    }
}

/// Last owner left a path: bring back the parked original if one exists,
/// otherwise remove the deployed file.
fn restore_or_remove(
    ctx: &DeployContext<'_>,
    path: &ContentPath,
    dest: &Path,
) -> DeployResult<()> {
    let parked = path.join_under(ctx.originals_dir);
    if parked.is_file() {
        copy_file(&parked, dest)?;
        remove_quietly(&parked);
        prune_empty_dirs(&parked, ctx.originals_dir);
        return Ok(());
    }

    match fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(DeployError::write(dest, e)),
    }
    prune_empty_dirs(dest, ctx.target);
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
