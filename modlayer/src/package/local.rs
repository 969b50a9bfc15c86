//! Local package store.
//!
//! Installed packages live under a single packages root, one directory per
//! package, named by the package id. Import copies a source tree into the
//! store and records its content listing in a fresh manifest; uninstall
//! removes the directory. Whether a package may be uninstalled while still
//! deployed is the deployment service's call, not the store's.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::contents::content_paths;
use super::core::{Package, PackageId};
use super::manifest::{ManifestError, PackageManifest};

/// Result type for package store operations.
pub type PackageStoreResult<T> = Result<T, PackageStoreError>;

/// Errors raised by the local package store.
#[derive(Debug, Error)]
pub enum PackageStoreError {
    /// Filesystem access failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Manifest read/write failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// No installed package has this id.
    #[error("package not found: {id}")]
    NotFound { id: PackageId },

    /// A package with this id is already installed.
    #[error("package already installed: {id}")]
    AlreadyInstalled { id: PackageId },

    /// The display name produced an empty identifier.
    #[error("cannot derive a package id from name {name:?}")]
    InvalidName { name: String },
}

/// Store of installed packages under a packages root directory.
#[derive(Debug, Clone)]
pub struct LocalPackageStore {
    packages_root: PathBuf,
}

impl LocalPackageStore {
    /// Create a store over the given packages root.
    ///
    /// The directory is created lazily on first import.
    pub fn new(packages_root: impl Into<PathBuf>) -> Self {
        Self {
            packages_root: packages_root.into(),
        }
    }

    /// The packages root directory.
    pub fn packages_root(&self) -> &Path {
        &self.packages_root
    }

    /// Directory a package with this id occupies (installed or not).
    pub fn package_root(&self, id: &PackageId) -> PathBuf {
        self.packages_root.join(id.as_str())
    }

    /// Check whether a package with this id is installed.
    pub fn is_installed(&self, id: &PackageId) -> bool {
        self.package_root(id).is_dir()
    }

    /// Get an installed package by id.
    pub fn get(&self, id: &PackageId) -> PackageStoreResult<Package> {
        let root = self.package_root(id);
        if !root.is_dir() {
            return Err(PackageStoreError::NotFound { id: id.clone() });
        }
        let manifest = PackageManifest::load(&root)?;
        Ok(Package::new(id.clone(), manifest.name, root))
    }

    /// List all installed packages, sorted by id.
    ///
    /// Directories without a readable manifest are skipped with a warning
    /// rather than failing the whole listing.
    pub fn list(&self) -> PackageStoreResult<Vec<Package>> {
        let mut packages = Vec::new();
        let entries = match fs::read_dir(&self.packages_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(packages),
            Err(source) => {
                return Err(PackageStoreError::Io {
                    path: self.packages_root.clone(),
                    source,
                })
            }
        };

        for entry in entries.flatten() {
            let root = entry.path();
            if !root.is_dir() {
                continue;
            }
            let Some(id) = root.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match PackageManifest::load(&root) {
                Ok(manifest) => {
                    packages.push(Package::new(PackageId::new(id), manifest.name, root));
                }
                Err(e) => {
                    tracing::warn!(
                        path = %root.display(),
                        error = %e,
                        "Skipping package directory with unreadable manifest"
                    );
                }
            }
        }

        packages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packages)
    }

    /// Import a content tree as a new package.
    ///
    /// Copies `source_dir` into the store under the derived id, enumerates
    /// the copied contents and writes the initial manifest.
    pub fn import(&self, source_dir: &Path, display_name: &str) -> PackageStoreResult<Package> {
        let id = PackageId::derive(display_name);
        if id.as_str().is_empty() {
            return Err(PackageStoreError::InvalidName {
                name: display_name.to_string(),
            });
        }
        let dest = self.package_root(&id);
        if dest.exists() {
            return Err(PackageStoreError::AlreadyInstalled { id });
        }

        fs::create_dir_all(&self.packages_root).map_err(|source| PackageStoreError::Io {
            path: self.packages_root.clone(),
            source,
        })?;
        copy_dir_recursive(source_dir, &dest)?;

        let entries = content_paths(&dest).map_err(|source| PackageStoreError::Io {
            path: dest.clone(),
            source,
        })?;
        let manifest = PackageManifest::new(display_name, &entries);
        manifest.save(&dest)?;

        tracing::info!(
            id = %id,
            path = %dest.display(),
            files = entries.len(),
            "Imported package"
        );

        Ok(Package::new(id, display_name, dest))
    }

    /// Remove an installed package's directory.
    pub fn uninstall(&self, id: &PackageId) -> PackageStoreResult<()> {
        let root = self.package_root(id);
        if !root.is_dir() {
            return Err(PackageStoreError::NotFound { id: id.clone() });
        }
        fs::remove_dir_all(&root).map_err(|source| PackageStoreError::Io {
            path: root,
            source,
        })?;
        tracing::info!(id = %id, "Uninstalled package");
        Ok(())
    }
}

/// Recursively copy a directory.
fn copy_dir_recursive(source: &Path, dest: &Path) -> PackageStoreResult<()> {
    fs::create_dir_all(dest).map_err(|e| PackageStoreError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;

    for entry in fs::read_dir(source).map_err(|e| PackageStoreError::Io {
        path: source.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(|e| PackageStoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_dir_recursive(&source_path, &dest_path)?;
        } else {
            fs::copy(&source_path, &dest_path).map_err(|e| PackageStoreError::Io {
                path: dest_path,
                source: e,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_source(dir: &Path) -> PathBuf {
        let source = dir.join("source");
        fs::create_dir_all(source.join("textures")).unwrap();
        fs::write(source.join("textures/x.png"), "png").unwrap();
        fs::write(source.join("readme.txt"), "hi").unwrap();
        source
    }

    #[test]
    fn test_import_creates_package() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));

        let package = store.import(&source, "Better Trees").unwrap();

        assert_eq!(package.id.as_str(), "better_trees");
        assert!(package.root().join("textures/x.png").exists());
        assert!(PackageManifest::path_for(package.root()).exists());

        let manifest = PackageManifest::load(package.root()).unwrap();
        assert_eq!(manifest.name, "Better Trees");
        assert_eq!(manifest.contents.len(), 2);
    }

    #[test]
    fn test_import_rejects_duplicate() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));

        store.import(&source, "Better Trees").unwrap();
        let err = store.import(&source, "Better Trees!").unwrap_err();
        assert!(matches!(err, PackageStoreError::AlreadyInstalled { .. }));
    }

    #[test]
    fn test_import_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));

        let err = store.import(&source, "!!!").unwrap_err();
        assert!(matches!(err, PackageStoreError::InvalidName { .. }));
    }

    #[test]
    fn test_list_and_get() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));

        store.import(&source, "Zeta").unwrap();
        store.import(&source, "Alpha").unwrap();

        let listed = store.list().unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);

        let got = store.get(&PackageId::new("alpha")).unwrap();
        assert_eq!(got.name, "Alpha");
    }

    #[test]
    fn test_list_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = LocalPackageStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_uninstall_removes_directory() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));

        let package = store.import(&source, "Better Trees").unwrap();
        assert!(store.is_installed(&package.id));

        store.uninstall(&package.id).unwrap();
        assert!(!store.is_installed(&package.id));
    }

    #[test]
    fn test_uninstall_missing_package() {
        let dir = TempDir::new().unwrap();
        let store = LocalPackageStore::new(dir.path().join("packages"));
        let err = store.uninstall(&PackageId::new("nope")).unwrap_err();
        assert!(matches!(err, PackageStoreError::NotFound { .. }));
    }

    #[test]
    fn test_list_skips_broken_manifest() {
        let dir = TempDir::new().unwrap();
        let source = make_source(dir.path());
        let store = LocalPackageStore::new(dir.path().join("packages"));
        store.import(&source, "Good").unwrap();

        // Directory with no manifest at all.
        fs::create_dir_all(dir.path().join("packages/broken")).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.as_str(), "good");
    }
}
