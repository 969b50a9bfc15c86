//! Package integrity checking.
//!
//! Compares a package's manifest-recorded content listing against a live
//! walk of its directory. Only the path sets matter: a recorded path that
//! vanished, or a live path that was never recorded, flags the package as
//! modified. Size or mtime drift on a matching path set is tolerated, so
//! re-installing identical content with fresh timestamps stays clean.

use std::collections::BTreeSet;
use std::path::Path;

use crate::package::{content_paths, ContentPath, PackageManifest};

use super::error::{DeployError, DeployResult};

/// Outcome of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Recorded paths no longer present on disk.
    pub missing: Vec<ContentPath>,

    /// Live paths the manifest never recorded.
    pub unrecorded: Vec<ContentPath>,
}

impl IntegrityReport {
    /// Whether the package's content drifted from its recorded listing.
    pub fn is_modified(&self) -> bool {
        !self.missing.is_empty() || !self.unrecorded.is_empty()
    }
}

/// The caller's decision after a "modified" report.
///
/// The engine never picks one of these itself: the check gates an enable,
/// and only the caller knows whether drift is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityResolution {
    /// Accept the drift: re-record the live listing and proceed.
    RefreshManifest,
    /// Remove the package entirely.
    Uninstall,
    /// Abort the pending enable.
    Cancel,
}

/// Compare a package's recorded listing against its live content tree.
pub fn check_integrity(
    manifest: &PackageManifest,
    package_root: &Path,
) -> DeployResult<IntegrityReport> {
    let live = content_paths(package_root).map_err(|e| DeployError::read(package_root, e))?;

    let recorded: BTreeSet<&ContentPath> = manifest.contents.iter().map(|e| &e.path).collect();
    let on_disk: BTreeSet<&ContentPath> = live.iter().map(|e| &e.path).collect();

    let report = IntegrityReport {
        missing: recorded
            .difference(&on_disk)
            .map(|p| (*p).clone())
            .collect(),
        unrecorded: on_disk
            .difference(&recorded)
            .map(|p| (*p).clone())
            .collect(),
    };

    if report.is_modified() {
        tracing::warn!(
            name = %manifest.name,
            missing = report.missing.len(),
            unrecorded = report.unrecorded.len(),
            "Package content drifted from its recorded listing"
        );
    }
    Ok(report)
}
