//! Symlink-overlay deployment and the overlay refresh job.
//!
//! In overlay mode nothing is ever copied into the target. The virtual
//! overlay folder holds one symlink per provided content path, pointing at
//! whichever source currently wins that path:
//!
//! 1. the highest-priority enabled package claiming it, per the priority
//!    records (or the sole claimant when unconflicted)
//! 2. otherwise the hidden-original file parked by the mode transition
//!
//! A directory junction at the target path makes the overlay visible to
//! the application. When the junction is missing (fallback configuration,
//! e.g. its creation needed rights the user didn't have) a mirror pass
//! maintains equivalent symlinks directly inside the target directory.
//!
//! The refresh is a full reconcile: idempotent (a second run with no state
//! change performs zero mutations), best-effort per path, and it never
//! aborts early — every failure is recorded and the job moves on.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::package::{content_paths, ContentEntry, ContentPath, Package, PackageId};
use crate::platform;

use super::error::{DeployError, DeployResult, PathFailure};
use super::util::{collect_links, ensure_link, ensure_overlay_root, prune_empty_dirs, LinkAction};
use super::{DeployContext, DeployStrategy, DisableReport, EnableReport, RefreshReport};

/// The symlink-overlay strategy.
pub struct OverlayStrategy;

impl DeployStrategy for OverlayStrategy {
    fn enable(
        &self,
        ctx: &mut DeployContext<'_>,
        package: &Package,
        entries: &[ContentEntry],
    ) -> DeployResult<EnableReport> {
        let mut deployed = 0;
        let mut skipped = 0;
        for entry in entries {
            if ctx.ownership.push(&entry.path, &package.id) {
                deployed += 1;
            } else {
                skipped += 1;
            }
        }

        let refresh = self.refresh(ctx)?;
        tracing::info!(
            id = %package.id,
            claimed = deployed,
            skipped,
            links_touched = refresh.mutation_count(),
            "Enabled package (overlay)"
        );
        Ok(EnableReport {
            deployed,
            skipped,
            failures: refresh.failures,
        })
    }

    fn disable(&self, ctx: &mut DeployContext<'_>, id: &PackageId) -> DeployResult<DisableReport> {
        // Recorded ownership, never a live re-walk: the package directory
        // may already be gone.
        let paths = ctx.ownership.paths_claimed_by(id);
        for path in &paths {
            ctx.ownership.pop(path, id);
        }

        let refresh = self.refresh(ctx)?;
        tracing::info!(
            id = %id,
            released = paths.len(),
            links_touched = refresh.mutation_count(),
            "Disabled package (overlay)"
        );
        Ok(DisableReport {
            restored: refresh.replaced,
            removed: refresh.removed,
            failures: refresh.failures,
        })
    }

    fn refresh(&self, ctx: &mut DeployContext<'_>) -> DeployResult<RefreshReport> {
        let mut report = RefreshReport::default();

        // Desired view: every provided path mapped to its winning source.
        let mut desired: BTreeMap<ContentPath, PathBuf> = BTreeMap::new();
        for (path, stack) in ctx.ownership.iter() {
            let ranked = ctx.priorities.rank(stack);
            let winner = ranked.iter().find_map(|id| {
                ctx.package_roots
                    .get(id)
                    .map(|root| path.join_under(root))
                    .filter(|source| source.is_file())
            });
            if let Some(source) = winner {
                desired.insert(path.clone(), source);
            }
            // No enabled package can provide the path: the hidden original
            // (below) may still cover it, otherwise its link goes stale and
            // is removed.
        }
        if ctx.hidden_dir.is_dir() {
            let originals = content_paths(ctx.hidden_dir)
                .map_err(|e| DeployError::read(ctx.hidden_dir, e))?;
            for entry in originals {
                let source = entry.path.join_under(ctx.hidden_dir);
                desired.entry(entry.path).or_insert(source);
            }
        }
        report.examined = desired.len();

        ensure_overlay_root(ctx.overlay_dir)?;

        // Create or fix links for every desired path.
        for (path, source) in &desired {
            let link = path.join_under(ctx.overlay_dir);
            match ensure_link(&link, source) {
                Ok(LinkAction::Created) => report.created += 1,
                Ok(LinkAction::Replaced) => report.replaced += 1,
                Ok(LinkAction::Unchanged) => {}
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to reconcile overlay link");
                    report.failures.push(PathFailure::new(path.clone(), e.to_string()));
                }
            }
        }

        // Drop links no source provides any more.
        for (path, link) in collect_links(ctx.overlay_dir)? {
            if desired.contains_key(&path) {
                continue;
            }
            match platform::remove_file_link(&link) {
                Ok(()) => {
                    report.removed += 1;
                    prune_empty_dirs(&link, ctx.overlay_dir);
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to remove stale overlay link");
                    report.failures.push(PathFailure::new(path.clone(), e.to_string()));
                }
            }
        }

        // Mirror pass for the fallback configuration.
        if !target_is_overlay_junction(ctx)? {
            mirror_into_target(ctx, &desired, &mut report)?;
        }

        tracing::debug!(
            examined = report.examined,
            created = report.created,
            replaced = report.replaced,
            removed = report.removed,
            mirrored = report.mirrored,
            failed = report.failures.len(),
            "Overlay refresh complete"
        );
        Ok(report)
    }
}

/// Whether the target path is the junction into the overlay folder.
///
/// A link pointing anywhere else is treated as a collision: mirroring into
/// a foreign directory would scribble over something we do not own.
fn target_is_overlay_junction(ctx: &DeployContext<'_>) -> DeployResult<bool> {
    if !platform::is_link(ctx.target) {
        return Ok(false);
    }
    let actual = platform::link_target(ctx.target).map_err(|e| DeployError::read(ctx.target, e))?;
    if actual == ctx.overlay_dir {
        Ok(true)
    } else {
        Err(DeployError::TargetCollision {
            path: ctx.target.to_path_buf(),
            reason: format!("links to unexpected location {}", actual.display()),
        })
    }
}

/// Maintain target-side symlinks mirroring the overlay (fallback when the
/// junction is absent).
fn mirror_into_target(
    ctx: &DeployContext<'_>,
    desired: &BTreeMap<ContentPath, PathBuf>,
    report: &mut RefreshReport,
) -> DeployResult<()> {
    fs::create_dir_all(ctx.target).map_err(|e| DeployError::create_dir(ctx.target, e))?;

    for path in desired.keys() {
        let overlay_file = path.join_under(ctx.overlay_dir);
        let link = path.join_under(ctx.target);
        match ensure_link(&link, &overlay_file) {
            Ok(LinkAction::Created) | Ok(LinkAction::Replaced) => report.mirrored += 1,
            Ok(LinkAction::Unchanged) => {}
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to mirror link into target");
                report.failures.push(PathFailure::new(path.clone(), e.to_string()));
            }
        }
    }

    // Remove target-side links whose path left the overlay. Regular files
    // in the target are never touched.
    for (path, link) in collect_links(ctx.target)? {
        if desired.contains_key(&path) {
            continue;
        }
        match platform::remove_file_link(&link) {
            Ok(()) => {
                report.removed += 1;
                prune_empty_dirs(&link, ctx.target);
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to remove stale mirror link");
                report.failures.push(PathFailure::new(path.clone(), e.to_string()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::store::{OwnershipStacks, PriorityRecords};

    struct Fixture {
        _dir: TempDir,
        target: PathBuf,
        overlay: PathBuf,
        hidden: PathBuf,
        originals: PathBuf,
        ownership: OwnershipStacks,
        priorities: PriorityRecords,
        package_roots: BTreeMap<PackageId, PathBuf>,
        packages: BTreeMap<String, Package>,
    }

    impl Fixture {
        /// Fixture in the fallback configuration: the target is a plain
        /// directory, so refreshes also run the mirror pass.
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let target = dir.path().join("target");
            fs::create_dir_all(&target).unwrap();
            Self {
                overlay: dir.path().join("overlay"),
                hidden: dir.path().join("hidden"),
                originals: dir.path().join("originals"),
                target,
                _dir: dir,
                ownership: OwnershipStacks::new(),
                priorities: PriorityRecords::new(),
                package_roots: BTreeMap::new(),
                packages: BTreeMap::new(),
            }
        }

        /// Fixture with the junction in place: no mirror pass.
        fn new_with_junction() -> Self {
            let mut fx = Self::new();
            fs::remove_dir_all(&fx.target).unwrap();
            fs::create_dir_all(&fx.overlay).unwrap();
            platform::create_dir_link(&fx.overlay, &fx.target).unwrap();
            fx
        }

        fn add_package(&mut self, name: &str, files: &[(&str, &str)]) -> Package {
            let root = self._dir.path().join("packages").join(name);
            fs::create_dir_all(&root).unwrap();
            for (rel, contents) in files {
                let path = root.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, contents).unwrap();
            }
            let package = Package::new(PackageId::derive(name), name, &root);
            self.package_roots.insert(package.id.clone(), root);
            self.packages.insert(name.to_string(), package.clone());
            package
        }

        fn ctx(&mut self) -> DeployContext<'_> {
            DeployContext {
                target: &self.target,
                overlay_dir: &self.overlay,
                hidden_dir: &self.hidden,
                originals_dir: &self.originals,
                ownership: &mut self.ownership,
                priorities: &self.priorities,
                package_roots: &self.package_roots,
            }
        }

        fn enable(&mut self, name: &str) -> DeployResult<EnableReport> {
            let package = self.packages[name].clone();
            let entries = content_paths(package.root()).unwrap();
            let mut ctx = self.ctx();
            OverlayStrategy.enable(&mut ctx, &package, &entries)
        }

        fn disable(&mut self, name: &str) -> DisableReport {
            let id = PackageId::derive(name);
            let mut ctx = self.ctx();
            OverlayStrategy.disable(&mut ctx, &id).unwrap()
        }

        fn refresh(&mut self) -> RefreshReport {
            let mut ctx = self.ctx();
            OverlayStrategy.refresh(&mut ctx).unwrap()
        }

        fn overlay_link_target(&self, rel: &str) -> Option<PathBuf> {
            fs::read_link(self.overlay.join(rel)).ok()
        }
    }

    #[test]
    fn test_enable_links_package_files() {
        let mut fx = Fixture::new();
        let alpha = fx.add_package("alpha", &[("textures/x.png", "alpha")]);

        let report = fx.enable("alpha").unwrap();

        assert_eq!(report.deployed, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            fx.overlay_link_target("textures/x.png").unwrap(),
            alpha.root().join("textures/x.png")
        );
        // Fallback configuration: the target mirrors the overlay.
        assert_eq!(
            fs::read_link(fx.target.join("textures/x.png")).unwrap(),
            fx.overlay.join("textures/x.png")
        );
        // Reading through the mirror resolves to the package's bytes.
        assert_eq!(
            fs::read_to_string(fx.target.join("textures/x.png")).unwrap(),
            "alpha"
        );
    }

    #[test]
    fn test_no_mirror_links_when_junction_present() {
        let mut fx = Fixture::new_with_junction();
        fx.add_package("alpha", &[("a.txt", "alpha")]);

        let report = fx.enable("alpha").unwrap();
        assert_eq!(report.deployed, 1);
        assert_eq!(fx.refresh().mirrored, 0);

        // The junction exposes the overlay's links directly.
        assert_eq!(
            fs::read_to_string(fx.target.join("a.txt")).unwrap(),
            "alpha"
        );
    }

    #[test]
    fn test_priority_record_decides_winner() {
        let mut fx = Fixture::new();
        let alpha = fx.add_package("alpha", &[("shared.txt", "alpha")]);
        let beta = fx.add_package("beta", &[("shared.txt", "beta")]);

        fx.enable("alpha").unwrap();
        fx.enable("beta").unwrap();

        // Without a record the winner falls back to sorted ids: alpha.
        assert_eq!(
            fx.overlay_link_target("shared.txt").unwrap(),
            alpha.root().join("shared.txt")
        );

        // Recording beta first flips the link on the next refresh.
        fx.priorities.record(vec![beta.id.clone(), alpha.id.clone()]);
        let report = fx.refresh();
        assert_eq!(report.replaced, 1);
        assert_eq!(
            fx.overlay_link_target("shared.txt").unwrap(),
            beta.root().join("shared.txt")
        );
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut fx = Fixture::new();
        fx.add_package("alpha", &[("a.txt", "alpha"), ("b/c.txt", "alpha")]);
        fs::create_dir_all(&fx.hidden).unwrap();
        fs::write(fx.hidden.join("orig.txt"), "original").unwrap();

        fx.enable("alpha").unwrap();
        let first = fx.refresh();
        assert_eq!(first.mutation_count(), 0, "first rerun already settled");

        let second = fx.refresh();
        assert_eq!(second.mutation_count(), 0);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn test_hidden_original_fallback() {
        let mut fx = Fixture::new();
        fs::create_dir_all(&fx.hidden).unwrap();
        fs::write(fx.hidden.join("orig.txt"), "original").unwrap();
        fx.add_package("alpha", &[("orig.txt", "alpha")]);

        // The enabled package outranks the hidden original.
        fx.enable("alpha").unwrap();
        assert_eq!(
            fs::read_to_string(fx.target.join("orig.txt")).unwrap(),
            "alpha"
        );

        // Once disabled, the path falls back to the hidden original.
        fx.disable("alpha");
        assert_eq!(
            fx.overlay_link_target("orig.txt").unwrap(),
            fx.hidden.join("orig.txt")
        );
        assert_eq!(
            fs::read_to_string(fx.target.join("orig.txt")).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_disable_removes_links_without_fallback() {
        let mut fx = Fixture::new();
        fx.add_package("alpha", &[("textures/x.png", "alpha")]);
        fx.enable("alpha").unwrap();
        assert!(platform::is_link(&fx.overlay.join("textures/x.png")));

        let report = fx.disable("alpha");

        assert_eq!(report.removed, 2, "overlay link and mirror link removed");
        assert!(!fx.overlay.join("textures/x.png").exists());
        assert!(!fx.overlay.join("textures").exists(), "empty dirs pruned");
        assert!(!fx.target.join("textures/x.png").exists());
        assert!(fx.ownership.is_empty());
    }

    #[test]
    fn test_lifo_release_in_overlay_mode() {
        let mut fx = Fixture::new();
        let alpha = fx.add_package("alpha", &[("shared.txt", "alpha")]);
        let beta = fx.add_package("beta", &[("shared.txt", "beta")]);
        fx.enable("alpha").unwrap();
        fx.enable("beta").unwrap();
        fx.priorities.record(vec![beta.id.clone(), alpha.id.clone()]);
        fx.refresh();

        fx.disable("beta");

        assert_eq!(
            fx.overlay_link_target("shared.txt").unwrap(),
            alpha.root().join("shared.txt")
        );
    }

    #[test]
    fn test_stale_link_for_missing_source_is_removed() {
        let mut fx = Fixture::new();
        let alpha = fx.add_package("alpha", &[("a.txt", "alpha")]);
        fx.enable("alpha").unwrap();

        // The package directory disappears; its claim survives until GC,
        // but the refresh can no longer find a source for the path.
        fs::remove_dir_all(alpha.root()).unwrap();
        let report = fx.refresh();

        assert_eq!(report.removed, 2, "overlay link and mirror link removed");
        assert!(!fx.overlay.join("a.txt").exists());
    }

    #[test]
    fn test_collision_with_regular_file_is_reported_not_fatal() {
        let mut fx = Fixture::new();
        fx.add_package("alpha", &[("blocked.txt", "alpha"), ("fine.txt", "alpha")]);

        // A real file sits where the overlay link should go.
        fs::create_dir_all(&fx.overlay).unwrap();
        fs::write(fx.overlay.join("blocked.txt"), "not a link").unwrap();

        let report = fx.enable("alpha").unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path.as_str(), "blocked.txt");
        // The job continued past the collision.
        assert!(platform::is_link(&fx.overlay.join("fine.txt")));
        // The colliding file was not touched.
        assert_eq!(
            fs::read_to_string(fx.overlay.join("blocked.txt")).unwrap(),
            "not a link"
        );
    }

    #[test]
    fn test_refresh_creates_marker_file() {
        let mut fx = Fixture::new();
        fx.add_package("alpha", &[("a.txt", "alpha")]);
        fx.enable("alpha").unwrap();

        assert!(fx.overlay.join(crate::package::OVERLAY_MARKER).is_file());
    }

    #[test]
    fn test_mirror_pass_removes_stale_target_links() {
        let mut fx = Fixture::new();
        fx.add_package("alpha", &[("a.txt", "alpha")]);
        fx.enable("alpha").unwrap();

        // A leftover mirror link whose overlay path no longer exists.
        platform::symlink_file(&fx.overlay.join("gone.txt"), &fx.target.join("gone.txt"))
            .unwrap();

        let report = fx.refresh();
        assert_eq!(report.removed, 1);
        assert!(!platform::is_link(&fx.target.join("gone.txt")));

        // Real files in the target are left alone.
        fs::write(fx.target.join("users_own.txt"), "keep me").unwrap();
        fx.refresh();
        assert!(fx.target.join("users_own.txt").is_file());
    }
}
