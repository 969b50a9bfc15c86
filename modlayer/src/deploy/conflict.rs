//! Path collision detection between packages.
//!
//! Conflicts are reported pairwise: a three-way collision on one path
//! yields three `(first, second, path)` tuples. The detector runs before
//! enable (to gate priority resolution) and before merge-style operations
//! that must reject ambiguous inputs.

use std::collections::BTreeMap;

use crate::package::{content_paths, ContentPath, Package, PackageId};

use super::error::{DeployError, DeployResult};

/// Two packages claiming the same content path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// First claimant, in package discovery order.
    pub first: PackageId,
    /// Second claimant.
    pub second: PackageId,
    /// The shared path.
    pub path: ContentPath,
}

/// Find every pairwise collision among the given packages.
///
/// Each package's content tree is walked; paths claimed by two or more
/// packages produce one conflict per unordered claimant pair. Results are
/// ordered by path, then by claimant discovery order.
pub fn find_conflicts(packages: &[Package]) -> DeployResult<Vec<Conflict>> {
    let mut claims: BTreeMap<ContentPath, Vec<PackageId>> = BTreeMap::new();

    for package in packages {
        let entries = content_paths(package.root())
            .map_err(|e| DeployError::read(package.root(), e))?;
        for entry in entries {
            let claimants = claims.entry(entry.path).or_default();
            if !claimants.contains(&package.id) {
                claimants.push(package.id.clone());
            }
        }
    }

    let mut conflicts = Vec::new();
    for (path, claimants) in &claims {
        if claimants.len() < 2 {
            continue;
        }
        for i in 0..claimants.len() {
            for j in (i + 1)..claimants.len() {
                conflicts.push(Conflict {
                    first: claimants[i].clone(),
                    second: claimants[j].clone(),
                    path: path.clone(),
                });
            }
        }
    }

    Ok(conflicts)
}

/// The packages a given package collides with, in discovery order.
pub fn opponents_of(conflicts: &[Conflict], id: &PackageId) -> Vec<PackageId> {
    let mut opponents = Vec::new();
    for conflict in conflicts {
        let other = if conflict.first == *id {
            &conflict.second
        } else if conflict.second == *id {
            &conflict.first
        } else {
            continue;
        };
        if !opponents.contains(other) {
            opponents.push(other.clone());
        }
    }
    opponents
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn make_package(root: &Path, name: &str, files: &[&str]) -> Package {
        let dir = root.join(name);
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, name).unwrap();
        }
        Package::new(PackageId::derive(name), name, dir)
    }

    #[test]
    fn test_no_conflicts_between_disjoint_packages() {
        let dir = TempDir::new().unwrap();
        let a = make_package(dir.path(), "a", &["one.txt"]);
        let b = make_package(dir.path(), "b", &["two.txt"]);

        assert!(find_conflicts(&[a, b]).unwrap().is_empty());
    }

    #[test]
    fn test_single_shared_path_yields_one_tuple() {
        let dir = TempDir::new().unwrap();
        let a = make_package(dir.path(), "a", &["textures/x.png"]);
        let b = make_package(dir.path(), "b", &["textures/x.png", "b_only.txt"]);

        let conflicts = find_conflicts(&[a, b]).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].first.as_str(), "a");
        assert_eq!(conflicts[0].second.as_str(), "b");
        assert_eq!(conflicts[0].path.as_str(), "textures/x.png");
    }

    #[test]
    fn test_three_way_collision_yields_three_pairs() {
        let dir = TempDir::new().unwrap();
        let a = make_package(dir.path(), "a", &["shared.txt"]);
        let b = make_package(dir.path(), "b", &["shared.txt"]);
        let c = make_package(dir.path(), "c", &["shared.txt"]);

        let conflicts = find_conflicts(&[a, b, c]).unwrap();
        assert_eq!(conflicts.len(), 3);

        let pairs: Vec<(&str, &str)> = conflicts
            .iter()
            .map(|c| (c.first.as_str(), c.second.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    }

    #[test]
    fn test_multiple_shared_paths_reported_per_path() {
        let dir = TempDir::new().unwrap();
        let a = make_package(dir.path(), "a", &["one.txt", "two.txt"]);
        let b = make_package(dir.path(), "b", &["one.txt", "two.txt"]);

        let conflicts = find_conflicts(&[a, b]).unwrap();
        assert_eq!(conflicts.len(), 2);
        let paths: Vec<&str> = conflicts.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["one.txt", "two.txt"]);
    }

    #[test]
    fn test_opponents_of() {
        let dir = TempDir::new().unwrap();
        let a = make_package(dir.path(), "a", &["shared.txt"]);
        let b = make_package(dir.path(), "b", &["shared.txt", "other.txt"]);
        let c = make_package(dir.path(), "c", &["shared.txt", "other.txt"]);

        let conflicts = find_conflicts(&[a, b, c]).unwrap();

        let opponents = opponents_of(&conflicts, &PackageId::new("b"));
        let names: Vec<&str> = opponents.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);

        assert!(opponents_of(&conflicts, &PackageId::new("unrelated")).is_empty());
    }
}
