//! Core package identity types.
//!
//! The [`PackageId`] and [`Package`] types represent the essential identity
//! of a content package, shared across all contexts: the package store, the
//! deployment engine and the persisted ownership/priority records.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::naming::derive_package_id;

/// Stable identifier for a package.
///
/// Derived from the package's display name at import time (see
/// [`derive_package_id`]) and used everywhere the package is referenced:
/// ownership stacks, priority records, conflict reports. Identifiers are
/// lowercase and never change once a package is imported.
///
/// # Example
///
/// ```
/// use modlayer::package::PackageId;
///
/// let id = PackageId::derive("Better Trees");
/// assert_eq!(id.as_str(), "better_trees");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Derive an identifier from a display name.
    pub fn derive(display_name: &str) -> Self {
        Self(derive_package_id(display_name))
    }

    /// Wrap an already-derived identifier.
    ///
    /// Used when reading persisted records; the stored string is trusted to
    /// have been produced by [`PackageId::derive`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An installed package: identity plus its root directory on disk.
///
/// The root directory contains the package's content tree and the reserved
/// `.modlayer/` metadata subtree. A `Package` exists from import until
/// uninstall; the deployment engine only ever needs the id and the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Stable identifier, derived from the display name at import time.
    pub id: PackageId,

    /// Display name as given by the user.
    pub name: String,

    /// Filesystem path to the package's root directory.
    pub root: PathBuf,
}

impl Package {
    /// Create a package handle.
    pub fn new(id: PackageId, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            root: root.into(),
        }
    }

    /// The package's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of one of this package's content files.
    pub fn content_file(&self, path: &crate::package::ContentPath) -> PathBuf {
        path.join_under(&self.root)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_derive() {
        let id = PackageId::derive("Better Trees");
        assert_eq!(id.as_str(), "better_trees");
    }

    #[test]
    fn test_package_id_display() {
        let id = PackageId::new("hq_textures");
        assert_eq!(format!("{}", id), "hq_textures");
    }

    #[test]
    fn test_package_id_ordering_is_lexicographic() {
        let a = PackageId::new("alpha");
        let b = PackageId::new("beta");
        assert!(a < b);
    }

    #[test]
    fn test_package_new() {
        let pkg = Package::new(PackageId::derive("My Mod"), "My Mod", "/packages/my_mod");
        assert_eq!(pkg.id.as_str(), "my_mod");
        assert_eq!(pkg.name, "My Mod");
        assert_eq!(pkg.root(), Path::new("/packages/my_mod"));
    }

    #[test]
    fn test_package_display() {
        let pkg = Package::new(PackageId::derive("My Mod"), "My Mod", "/packages/my_mod");
        assert_eq!(format!("{}", pkg), "My Mod (my_mod)");
    }

    #[test]
    fn test_package_id_serde_transparent() {
        let id = PackageId::new("my_mod");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"my_mod\"");

        let back: PackageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
