//! Per-path ownership stacks.
//!
//! For every deployed content path the engine records which packages claim
//! it, bottom to top; the top entry is the package whose bytes are live in
//! the target directory in direct-copy mode, and the claimant set feeds the
//! overlay winner selection in overlay mode.
//!
//! Invariants maintained here:
//!
//! - a package id never appears twice in one path's stack
//! - a path with an empty stack is removed from the mapping entirely
//!
//! The record is schema-versioned JSON, saved via atomic write-replace.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::package::{ContentPath, PackageId};

use super::{atomic_write, StoreError, StoreResult};

/// Current ownership record schema version.
pub const OWNERSHIP_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct OwnershipFile {
    schema: u32,
    stacks: BTreeMap<ContentPath, Vec<PackageId>>,
}

/// The persisted path → ownership stack mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipStacks {
    stacks: BTreeMap<ContentPath, Vec<PackageId>>,
}

impl OwnershipStacks {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the record from disk; a missing file is an empty mapping.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file: OwnershipFile =
            serde_json::from_slice(&data).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if file.schema > OWNERSHIP_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                path: path.to_path_buf(),
                found: file.schema,
                supported: OWNERSHIP_SCHEMA_VERSION,
            });
        }
        Ok(Self {
            stacks: file.stacks,
        })
    }

    /// Persist the record.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let file = OwnershipFile {
            schema: OWNERSHIP_SCHEMA_VERSION,
            stacks: self.stacks.clone(),
        };
        let data = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write(path, &data).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Push a package onto a path's stack.
    ///
    /// Returns `false` without mutating when the id is already present
    /// anywhere in the stack; duplicate pushes are rejected.
    pub fn push(&mut self, path: &ContentPath, id: &PackageId) -> bool {
        let stack = self.stacks.entry(path.clone()).or_default();
        if stack.contains(id) {
            return false;
        }
        stack.push(id.clone());
        true
    }

    /// Remove a package from a path's stack, wherever it sits.
    ///
    /// Returns `true` if the id was present. An emptied stack drops the
    /// path from the mapping.
    pub fn pop(&mut self, path: &ContentPath, id: &PackageId) -> bool {
        let Some(stack) = self.stacks.get_mut(path) else {
            return false;
        };
        let Some(index) = stack.iter().position(|p| p == id) else {
            return false;
        };
        stack.remove(index);
        if stack.is_empty() {
            self.stacks.remove(path);
        }
        true
    }

    /// The current top owner of a path.
    pub fn top(&self, path: &ContentPath) -> Option<&PackageId> {
        self.stacks.get(path).and_then(|stack| stack.last())
    }

    /// The full stack for a path, bottom to top.
    pub fn owners(&self, path: &ContentPath) -> Option<&[PackageId]> {
        self.stacks.get(path).map(|stack| stack.as_slice())
    }

    /// Every path whose stack contains the given package.
    pub fn paths_claimed_by(&self, id: &PackageId) -> Vec<ContentPath> {
        self.stacks
            .iter()
            .filter(|(_, stack)| stack.contains(id))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Whether the package appears in any stack.
    pub fn contains_package(&self, id: &PackageId) -> bool {
        self.stacks.values().any(|stack| stack.contains(id))
    }

    /// The set of package ids present in any stack.
    pub fn package_ids(&self) -> BTreeSet<PackageId> {
        self.stacks
            .values()
            .flat_map(|stack| stack.iter().cloned())
            .collect()
    }

    /// Iterate over all (path, stack) entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentPath, &[PackageId])> {
        self.stacks
            .iter()
            .map(|(path, stack)| (path, stack.as_slice()))
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Whether no path is tracked.
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Prune entries referencing packages that no longer exist.
    ///
    /// `keep` is consulted once per distinct id; ids it rejects are removed
    /// from every stack. Returns the number of removed stack entries.
    pub fn gc<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&PackageId) -> bool,
    {
        let dead: BTreeSet<PackageId> = self
            .package_ids()
            .into_iter()
            .filter(|id| !keep(id))
            .collect();
        if dead.is_empty() {
            return 0;
        }

        let mut pruned = 0;
        self.stacks.retain(|path, stack| {
            let before = stack.len();
            stack.retain(|id| !dead.contains(id));
            pruned += before - stack.len();
            if stack.is_empty() {
                tracing::debug!(path = %path, "Dropping ownerless path entry during GC");
                false
            } else {
                true
            }
        });

        tracing::info!(
            packages = dead.len(),
            entries = pruned,
            "Pruned ownership entries for missing packages"
        );
        pruned
    }
}
