//! The deployment engine.
//!
//! Two strategies expose the same logical contract — "the target directory
//! shows the highest-priority provider of every content path" — with
//! different mechanics:
//!
//! - [`DirectCopyStrategy`] copies package files into the target and tracks
//!   per-path ownership stacks so disabling re-exposes the next owner
//! - [`OverlayStrategy`] never copies; it reconciles a folder of symlinks
//!   (the virtual overlay) that a directory junction makes visible at the
//!   target path
//!
//! ```text
//! Enable/Disable ──► Conflict Detector ──► Priority Resolver
//!                                               │
//!                        ┌──────────────────────┴─────────────────────┐
//!                        ▼ direct mode                                ▼ overlay mode
//!                 OwnershipStacks + file copies               Overlay Refresh Job
//!                        │                                            │
//!                        └──────────────► target directory ◄──────────┘
//! ```
//!
//! The strategies mutate state only through the [`DeployContext`] handed to
//! them; persistence and serialization of operations is the service layer's
//! job.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::package::{ContentEntry, Package, PackageId};
use crate::store::{DeploymentMode, OwnershipStacks, PriorityRecords};

mod conflict;
mod direct;
pub mod error;
mod integrity;
mod overlay;
mod transition;
mod util;

pub use conflict::{find_conflicts, opponents_of, Conflict};
pub use direct::DirectCopyStrategy;
pub use error::{DeployError, DeployResult, PathFailure};
pub use integrity::{check_integrity, IntegrityReport, IntegrityResolution};
pub use overlay::OverlayStrategy;
pub use transition::{setup_overlay_mode, teardown_overlay_mode, TeardownReport};

/// Everything a strategy needs to act: the resolved filesystem locations
/// plus mutable access to the shared persisted state.
///
/// Built fresh by the service for each operation; the service owns saving
/// the stores afterwards.
pub struct DeployContext<'a> {
    /// The directory deployment writes to (live target or sandbox).
    pub target: &'a Path,

    /// The virtual overlay folder (overlay mode only).
    pub overlay_dir: &'a Path,

    /// The hidden alias holding the target's original files while overlay
    /// mode is active.
    pub hidden_dir: &'a Path,

    /// Where direct-copy mode parks pre-existing target files it shadows,
    /// so disabling the last owner restores them byte-for-byte.
    pub originals_dir: &'a Path,

    /// Per-path ownership stacks.
    pub ownership: &'a mut OwnershipStacks,

    /// Persisted priority records.
    pub priorities: &'a PriorityRecords,

    /// Root directory of every installed package, by id.
    pub package_roots: &'a BTreeMap<PackageId, PathBuf>,
}

/// Result of enabling a package.
#[derive(Debug, Clone, Default)]
pub struct EnableReport {
    /// Paths now provided by the package.
    pub deployed: usize,

    /// Paths skipped because the package already claimed them.
    pub skipped: usize,

    /// Per-path failures from a best-effort reconcile (overlay mode).
    /// Direct-copy enable never reports these: it rolls back instead.
    pub failures: Vec<PathFailure>,
}

/// Result of disabling a package.
#[derive(Debug, Clone, Default)]
pub struct DisableReport {
    /// Paths where the next owner's file was re-exposed.
    pub restored: usize,

    /// Paths removed from the target (no remaining owner).
    pub removed: usize,

    /// Paths that could not be cleaned up; disabling is best-effort and
    /// never blocks on these.
    pub failures: Vec<PathFailure>,
}

/// Result of an overlay refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Content paths considered.
    pub examined: usize,

    /// Links newly created in the overlay.
    pub created: usize,

    /// Links that pointed at the wrong source and were recreated.
    pub replaced: usize,

    /// Stale links removed.
    pub removed: usize,

    /// Target-side mirror links created or fixed.
    pub mirrored: usize,

    /// Per-path failures; the job continues past every one of them.
    pub failures: Vec<PathFailure>,
}

impl RefreshReport {
    /// Total number of filesystem mutations this run performed.
    pub fn mutation_count(&self) -> usize {
        self.created + self.replaced + self.removed + self.mirrored
    }
}

/// One deployment strategy: the mechanics behind enable/disable/refresh for
/// a given [`DeploymentMode`].
pub trait DeployStrategy: Send + Sync {
    /// Make a package's content visible in the target.
    fn enable(
        &self,
        ctx: &mut DeployContext<'_>,
        package: &Package,
        entries: &[ContentEntry],
    ) -> DeployResult<EnableReport>;

    /// Withdraw a package, re-exposing whatever it was shadowing.
    ///
    /// Operates on recorded ownership only; the package's directory may
    /// already be gone.
    fn disable(&self, ctx: &mut DeployContext<'_>, id: &PackageId) -> DeployResult<DisableReport>;

    /// Reconcile the target with current enablement and priorities.
    fn refresh(&self, ctx: &mut DeployContext<'_>) -> DeployResult<RefreshReport>;
}

/// The strategy implementing a deployment mode.
pub fn strategy_for(mode: DeploymentMode) -> &'static dyn DeployStrategy {
    match mode {
        DeploymentMode::DirectCopy => &DirectCopyStrategy,
        DeploymentMode::SymlinkOverlay => &OverlayStrategy,
    }
}
