//! Error types for the deployment engine.

use std::io;
use std::path::PathBuf;

use crate::package::{ContentPath, PackageId, PackageStoreError};
use crate::store::{DeploymentMode, StoreError};

/// Result type for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// One failed path inside a batch operation.
///
/// Batch operations (disable, overlay refresh, teardown materialisation)
/// report these instead of aborting; atomic operations (direct-copy enable)
/// roll back and surface them inside [`DeployError::PartialFailure`].
#[derive(Debug, Clone)]
pub struct PathFailure {
    /// The content path that failed.
    pub path: ContentPath,
    /// Why it failed.
    pub reason: String,
}

impl PathFailure {
    pub fn new(path: ContentPath, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during deployment operations.
#[derive(Debug)]
pub enum DeployError {
    /// Failed to read a file or directory.
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to rename a path.
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The operation needs rights the process does not have.
    ///
    /// Symlink and junction creation commonly require elevation; there are
    /// no automatic retries, the caller must elevate and re-issue.
    PermissionDenied { path: PathBuf, source: io::Error },

    /// A package file that should provide a path is gone.
    SourceMissing { id: PackageId, path: ContentPath },

    /// Something unexpected occupies a path the engine needs.
    TargetCollision { path: PathBuf, reason: String },

    /// Symlink creation or replacement failed.
    SymlinkFailed {
        source: PathBuf,
        target: PathBuf,
        reason: String,
    },

    /// Expected a link but found something else.
    NotALink { path: PathBuf },

    /// A mode transition was requested while packages are still enabled.
    PackagesStillEnabled { count: usize },

    /// The operation is not valid in the current deployment mode.
    WrongMode {
        expected: DeploymentMode,
        actual: DeploymentMode,
    },

    /// No target directory has been configured.
    TargetUnconfigured,

    /// The package is still deployed and cannot be uninstalled.
    StillDeployed { id: PackageId },

    /// No installed package has this id.
    PackageNotFound { id: PackageId },

    /// A multi-path batch partially failed.
    PartialFailure {
        operation: &'static str,
        failures: Vec<PathFailure>,
    },

    /// The deployment service worker is no longer running.
    ServiceUnavailable,

    /// Persisted state could not be read or written.
    Store(StoreError),

    /// The local package store failed.
    PackageStore(PackageStoreError),
}

impl DeployError {
    /// Wrap a read error, classifying privilege problems.
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if crate::platform::is_permission_denied(&source) {
            Self::PermissionDenied { path, source }
        } else {
            Self::ReadFailed { path, source }
        }
    }

    /// Wrap a write error, classifying privilege problems.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if crate::platform::is_permission_denied(&source) {
            Self::PermissionDenied { path, source }
        } else {
            Self::WriteFailed { path, source }
        }
    }

    /// Wrap a directory creation error, classifying privilege problems.
    pub fn create_dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if crate::platform::is_permission_denied(&source) {
            Self::PermissionDenied { path, source }
        } else {
            Self::CreateDirFailed { path, source }
        }
    }
}

impl std::fmt::Display for DeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
            Self::RenameFailed { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} to {}: {}",
                    from.display(),
                    to.display(),
                    source
                )
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "permission denied at {} (elevate and retry): {}",
                    path.display(),
                    source
                )
            }
            Self::SourceMissing { id, path } => {
                write!(f, "package {} no longer provides {}", id, path)
            }
            Self::TargetCollision { path, reason } => {
                write!(f, "unexpected file at {}: {}", path.display(), reason)
            }
            Self::SymlinkFailed {
                source,
                target,
                reason,
            } => {
                write!(
                    f,
                    "symlink operation failed ({} -> {}): {}",
                    target.display(),
                    source.display(),
                    reason
                )
            }
            Self::NotALink { path } => {
                write!(f, "{} is not a link, refusing to touch it", path.display())
            }
            Self::PackagesStillEnabled { count } => {
                write!(
                    f,
                    "{} package(s) still enabled; disable them before switching modes",
                    count
                )
            }
            Self::WrongMode { expected, actual } => {
                write!(
                    f,
                    "operation requires {} mode but the target is in {} mode",
                    expected, actual
                )
            }
            Self::TargetUnconfigured => {
                write!(f, "no target directory configured")
            }
            Self::StillDeployed { id } => {
                write!(f, "package {} is still deployed; disable it first", id)
            }
            Self::PackageNotFound { id } => {
                write!(f, "package not found: {}", id)
            }
            Self::PartialFailure {
                operation,
                failures,
            } => {
                write!(f, "{} failed for {} path(s):", operation, failures.len())?;
                for failure in failures {
                    write!(f, " [{}: {}]", failure.path, failure.reason)?;
                }
                Ok(())
            }
            Self::ServiceUnavailable => {
                write!(f, "the deployment service is not running")
            }
            Self::Store(e) => write!(f, "state store error: {}", e),
            Self::PackageStore(e) => write!(f, "package store error: {}", e),
        }
    }
}

impl std::error::Error for DeployError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFailed { source, .. } => Some(source),
            Self::WriteFailed { source, .. } => Some(source),
            Self::CreateDirFailed { source, .. } => Some(source),
            Self::RenameFailed { source, .. } => Some(source),
            Self::PermissionDenied { source, .. } => Some(source),
            Self::Store(e) => Some(e),
            Self::PackageStore(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DeployError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<PackageStoreError> for DeployError {
    fn from(e: PackageStoreError) -> Self {
        Self::PackageStore(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::PackageNotFound {
            id: PackageId::new("missing"),
        };
        assert_eq!(err.to_string(), "package not found: missing");
    }

    #[test]
    fn test_partial_failure_lists_paths() {
        let err = DeployError::PartialFailure {
            operation: "enable",
            failures: vec![PathFailure::new(
                ContentPath::new("textures/x.png"),
                "disk full",
            )],
        };
        let msg = err.to_string();
        assert!(msg.contains("enable failed for 1 path(s)"));
        assert!(msg.contains("textures/x.png"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_permission_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = DeployError::write("/target/file", denied);
        assert!(matches!(err, DeployError::PermissionDenied { .. }));

        let other = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = DeployError::write("/target/file", other);
        assert!(matches!(err, DeployError::WriteFailed { .. }));
    }
}
