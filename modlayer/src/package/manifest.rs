//! Package manifest: descriptive metadata plus the recorded content listing.
//!
//! The manifest lives at `<package root>/.modlayer/manifest.json` and is the
//! only metadata the engine keeps about a package beyond what sits on disk.
//! The recorded content listing (path, size, mtime per entry) is what the
//! integrity checker compares against a live walk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::contents::{ContentEntry, ContentPath};
use super::naming::{MANIFEST_FILE, METADATA_DIR};

/// Current manifest schema version.
///
/// Bumped when the record layout changes; loading rejects versions newer
/// than this so an older build never silently misreads a newer record.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Errors raised while reading or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Filesystem access failed.
    #[error("failed to access manifest at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest file is not valid JSON for the expected layout.
    #[error("failed to parse manifest at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest was written by a newer build.
    #[error("manifest at {} has schema version {found}, this build supports up to {supported}", path.display())]
    UnsupportedSchema {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

/// One recorded content file.
///
/// Size and mtime are optional: older records may lack them, and the
/// integrity check tolerates their absence (it compares path sets only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative content path.
    pub path: ContentPath,

    /// Recorded size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Recorded modification time, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
}

impl From<&ContentEntry> for ManifestEntry {
    fn from(entry: &ContentEntry) -> Self {
        Self {
            path: entry.path.clone(),
            size: Some(entry.size),
            mtime: entry.mtime,
        }
    }
}

/// Persisted package manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Record layout version.
    pub schema: u32,

    /// Display name the package id was derived from.
    pub name: String,

    /// Free-form category labels.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Package author.
    #[serde(default)]
    pub author: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Package version.
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Relative path of a thumbnail image inside the metadata directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Recorded content listing at import (or last refresh) time.
    #[serde(default)]
    pub contents: Vec<ManifestEntry>,
}

impl PackageManifest {
    /// Create a fresh manifest for an imported package.
    pub fn new(name: impl Into<String>, entries: &[ContentEntry]) -> Self {
        Self {
            schema: MANIFEST_SCHEMA_VERSION,
            name: name.into(),
            categories: Vec::new(),
            author: String::new(),
            description: String::new(),
            version: Version::new(1, 0, 0),
            thumbnail: None,
            contents: entries.iter().map(ManifestEntry::from).collect(),
        }
    }

    /// Path of the manifest file for a package root.
    pub fn path_for(package_root: &Path) -> PathBuf {
        package_root.join(METADATA_DIR).join(MANIFEST_FILE)
    }

    /// Load the manifest of the package rooted at `package_root`.
    pub fn load(package_root: &Path) -> Result<Self, ManifestError> {
        let path = Self::path_for(package_root);
        let data = fs::read(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: Self =
            serde_json::from_slice(&data).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;
        if manifest.schema > MANIFEST_SCHEMA_VERSION {
            return Err(ManifestError::UnsupportedSchema {
                path,
                found: manifest.schema,
                supported: MANIFEST_SCHEMA_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Write the manifest into the package's metadata directory.
    ///
    /// The write is atomic: a temporary sibling file is renamed over the
    /// previous manifest so a crash never leaves a torn record.
    pub fn save(&self, package_root: &Path) -> Result<(), ManifestError> {
        let path = Self::path_for(package_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ManifestError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|source| ManifestError::Parse {
            path: path.clone(),
            source,
        })?;
        crate::store::atomic_write(&path, &data).map_err(|source| ManifestError::Io {
            path,
            source,
        })
    }

    /// Replace the recorded content listing with a fresh enumeration.
    ///
    /// Used when the caller chooses to accept on-disk drift reported by the
    /// integrity checker.
    pub fn refresh_contents(&mut self, entries: &[ContentEntry]) {
        self.contents = entries.iter().map(ManifestEntry::from).collect();
    }
}

/// Serialize [`semver::Version`] through its string form.
mod version_serde {
    use semver::Version;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::contents::content_paths;
    use tempfile::TempDir;

    fn sample_entries(dir: &Path) -> Vec<ContentEntry> {
        fs::create_dir_all(dir.join("textures")).unwrap();
        fs::write(dir.join("textures/x.png"), "png").unwrap();
        fs::write(dir.join("readme.txt"), "hello").unwrap();
        content_paths(dir).unwrap()
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let entries = sample_entries(dir.path());

        let mut manifest = PackageManifest::new("Better Trees", &entries);
        manifest.author = "someone".to_string();
        manifest.categories = vec!["trees".to_string()];
        manifest.save(dir.path()).unwrap();

        let loaded = PackageManifest::load(dir.path()).unwrap();
        assert_eq!(loaded.name, "Better Trees");
        assert_eq!(loaded.author, "someone");
        assert_eq!(loaded.version, Version::new(1, 0, 0));
        assert_eq!(loaded.contents.len(), 2);
        assert_eq!(loaded.contents[0].path.as_str(), "readme.txt");
        assert!(loaded.contents[0].size.is_some());
    }

    #[test]
    fn test_manifest_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = PackageManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn test_manifest_rejects_newer_schema() {
        let dir = TempDir::new().unwrap();
        let path = PackageManifest::path_for(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            format!(
                r#"{{"schema": {}, "name": "x", "version": "1.0.0"}}"#,
                MANIFEST_SCHEMA_VERSION + 1
            ),
        )
        .unwrap();

        let err = PackageManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedSchema { .. }));
    }

    #[test]
    fn test_manifest_refresh_contents() {
        let dir = TempDir::new().unwrap();
        let entries = sample_entries(dir.path());
        let mut manifest = PackageManifest::new("pkg", &entries);

        fs::write(dir.path().join("added.txt"), "new").unwrap();
        let fresh = content_paths(dir.path()).unwrap();
        manifest.refresh_contents(&fresh);

        assert_eq!(manifest.contents.len(), 3);
    }

    #[test]
    fn test_manifest_version_serializes_as_string() {
        let manifest = PackageManifest::new("pkg", &[]);
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"version\":\"1.0.0\""));
    }
}
