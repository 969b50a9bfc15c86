//! Package types, naming and the local package store.
//!
//! A package is an independently-deployable content bundle: a root directory
//! holding a content tree plus the reserved `.modlayer/` metadata subtree.
//! This module provides:
//!
//! - **PackageId / Package**: stable identity (id derived from the display
//!   name) and the installed-package handle
//! - **ContentPath / content_paths**: forward-slash normalized relative paths
//!   and the enumeration walk that excludes the metadata subtree
//! - **PackageManifest**: the persisted metadata record, including the
//!   content listing the integrity checker compares against
//! - **LocalPackageStore**: import, list, get and uninstall over the
//!   packages root directory
//!
//! # Type Hierarchy
//!
//! ```text
//! Package                     PackageManifest (persisted)
//! ├── id: PackageId           ├── name, categories, author, description
//! ├── name: String            ├── version: semver::Version
//! └── root: PathBuf           └── contents: Vec<ManifestEntry>
//! ```

mod contents;
mod core;
mod local;
mod manifest;
mod naming;

// Core types
pub use core::{Package, PackageId};

// Content enumeration
pub use contents::{content_paths, mtime_secs, ContentEntry, ContentPath};

// Manifest
pub use manifest::{ManifestEntry, ManifestError, PackageManifest, MANIFEST_SCHEMA_VERSION};

// Local store
pub use local::{LocalPackageStore, PackageStoreError, PackageStoreResult};

// Naming utilities
pub use naming::{
    derive_package_id, hidden_alias_name, MANIFEST_FILE, METADATA_DIR, OVERLAY_MARKER,
};
