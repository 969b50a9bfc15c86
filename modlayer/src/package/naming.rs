//! Centralized package and deployment naming conventions.
//!
//! This module is the single source of truth for all modlayer naming:
//! - Package identifiers derived from display names
//! - The reserved metadata directory inside a package (`.modlayer`)
//! - The hidden alias used while the target directory is overlay-backed
//! - Marker file names for modlayer-managed folders
//!
//! All other modules should use these functions rather than constructing
//! names directly. This keeps the package store, the deployment engine and
//! the CLI consistent.

/// Name of the reserved metadata directory inside every package root.
///
/// The subtree under this directory (manifest, thumbnail) is excluded from
/// content path enumeration and is never deployed.
pub const METADATA_DIR: &str = ".modlayer";

/// Manifest filename inside the metadata directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Marker file identifying a modlayer-managed overlay folder.
///
/// Destructive operations on the overlay folder refuse to run when the
/// marker is absent, so a mistyped path never wipes user data.
pub const OVERLAY_MARKER: &str = ".modlayer_overlay";

/// Derive a stable package identifier from a display name.
///
/// Lowercases the name and collapses every run of non-alphanumeric
/// characters into a single underscore. The result is stable across imports
/// of the same display name and safe to use as a directory name.
///
/// # Examples
///
/// ```
/// use modlayer::package::derive_package_id;
///
/// assert_eq!(derive_package_id("Better Trees"), "better_trees");
/// assert_eq!(derive_package_id("  HQ Textures v2! "), "hq_textures_v2");
/// assert_eq!(derive_package_id("simple"), "simple");
/// ```
pub fn derive_package_id(display_name: &str) -> String {
    let mut id = String::with_capacity(display_name.len());
    let mut pending_separator = false;

    for ch in display_name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !id.is_empty() {
                id.push('_');
            }
            pending_separator = false;
            for lower in ch.to_lowercase() {
                id.push(lower);
            }
        } else {
            pending_separator = true;
        }
    }

    id
}

/// Compute the hidden alias name for a target directory.
///
/// While overlay mode is active the original target directory is parked
/// under this alias in the same parent. The trailing space keeps it out of
/// the public namespace: no package content path can legitimately end in a
/// space, so the alias cannot collide with anything a package deploys.
///
/// # Examples
///
/// ```
/// use modlayer::package::hidden_alias_name;
///
/// assert_eq!(hidden_alias_name("Mods"), "Mods ");
/// ```
pub fn hidden_alias_name(target_name: &str) -> String {
    format!("{} ", target_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_package_id_basic() {
        assert_eq!(derive_package_id("Better Trees"), "better_trees");
        assert_eq!(derive_package_id("simple"), "simple");
    }

    #[test]
    fn test_derive_package_id_collapses_punctuation() {
        assert_eq!(derive_package_id("HQ -- Textures!!"), "hq_textures");
        assert_eq!(derive_package_id("a...b"), "a_b");
    }

    #[test]
    fn test_derive_package_id_trims_edges() {
        assert_eq!(derive_package_id("  spaced out  "), "spaced_out");
        assert_eq!(derive_package_id("!leading"), "leading");
        assert_eq!(derive_package_id("trailing?"), "trailing");
    }

    #[test]
    fn test_derive_package_id_is_stable() {
        assert_eq!(
            derive_package_id("My Package"),
            derive_package_id("My Package")
        );
    }

    #[test]
    fn test_derive_package_id_unicode_lowercase() {
        assert_eq!(derive_package_id("Überhaupt"), "überhaupt");
    }

    #[test]
    fn test_hidden_alias_name() {
        assert_eq!(hidden_alias_name("Mods"), "Mods ");
        assert_eq!(hidden_alias_name("Custom Content"), "Custom Content ");
    }

    #[test]
    fn test_hidden_alias_never_equals_public_name() {
        assert_ne!(hidden_alias_name("Mods"), "Mods");
    }
}
