//! Persisted priority records and the conflict-order resolver.
//!
//! A priority record is a total order (highest priority first) over one
//! specific conflict set, keyed by the set's signature: the sorted member
//! ids joined with `|`. Records are created whenever an order is confirmed
//! or computed, and looked up again when the same packages collide.
//!
//! Resolution order for a new conflict:
//!
//! 1. exact signature match — returned verbatim
//! 2. best partial match — the stored record sharing the most members with
//!    the conflicting set (at least two); its relative order is kept, new
//!    members are appended, and the newly-enabled package is prepended
//! 3. default — the new package first, then the rest in discovery order

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::package::PackageId;

use super::{atomic_write, StoreError, StoreResult};

/// Current priority record schema version.
pub const PRIORITY_SCHEMA_VERSION: u32 = 1;

/// Canonical signature of a conflict set: sorted ids joined with `|`.
///
/// # Example
///
/// ```
/// use modlayer::package::PackageId;
/// use modlayer::store::signature;
///
/// let members = [PackageId::new("beta"), PackageId::new("alpha")];
/// assert_eq!(signature(&members), "alpha|beta");
/// ```
pub fn signature(members: &[PackageId]) -> String {
    let sorted: BTreeSet<&str> = members.iter().map(|id| id.as_str()).collect();
    sorted.into_iter().collect::<Vec<_>>().join("|")
}

/// How a resolved order was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSource {
    /// A record for exactly this member set existed.
    Exact,
    /// Derived from the best partially-matching record.
    Partial,
    /// No usable record; default ordering applied.
    Default,
}

/// A resolved priority order, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Member ids, highest priority first.
    pub order: Vec<PackageId>,
    /// Where the order came from.
    pub source: OrderSource,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriorityFile {
    schema: u32,
    records: BTreeMap<String, Vec<PackageId>>,
}

/// The persisted signature → order mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityRecords {
    records: BTreeMap<String, Vec<PackageId>>,
}

impl PriorityRecords {
    /// An empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the records from disk; a missing file is an empty set.
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
        let file: PriorityFile =
            serde_json::from_slice(&data).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if file.schema > PRIORITY_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                path: path.to_path_buf(),
                found: file.schema,
                supported: PRIORITY_SCHEMA_VERSION,
            });
        }
        Ok(Self {
            records: file.records,
        })
    }

    /// Persist the records.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let file = PriorityFile {
            schema: PRIORITY_SCHEMA_VERSION,
            records: self.records.clone(),
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

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store (or overwrite) the record for the order's member set.
    pub fn record(&mut self, order: Vec<PackageId>) {
        let sig = signature(&order);
        self.records.insert(sig, order);
    }

    /// Look up the record matching exactly this member set.
    pub fn get_exact(&self, members: &[PackageId]) -> Option<&[PackageId]> {
        self.records
            .get(&signature(members))
            .map(|order| order.as_slice())
    }

    /// Resolve the deploy order for a newly-enabled package against the
    /// packages it conflicts with.
    ///
    /// `conflicting` is in discovery order and does not contain `new`.
    pub fn resolve_order(&self, new: &PackageId, conflicting: &[PackageId]) -> ResolvedOrder {
        let mut members: Vec<PackageId> = Vec::with_capacity(conflicting.len() + 1);
        members.push(new.clone());
        members.extend_from_slice(conflicting);

        // 1. Exact match on the full member set.
        if let Some(order) = self.get_exact(&members) {
            return ResolvedOrder {
                order: order.to_vec(),
                source: OrderSource::Exact,
            };
        }

        // 2. Best partial match against the conflicting set (the new
        //    package is excluded from the intersection on purpose: a record
        //    mentioning it describes a different situation).
        let conflict_set: BTreeSet<&PackageId> = conflicting.iter().collect();
        let mut best: Option<(usize, &Vec<PackageId>)> = None;
        for order in self.records.values() {
            let overlap = order.iter().filter(|id| conflict_set.contains(id)).count();
            if overlap >= 2 && best.map_or(true, |(size, _)| overlap > size) {
                best = Some((overlap, order));
            }
        }
        if let Some((_, record)) = best {
            let mut order: Vec<PackageId> = record
                .iter()
                .filter(|id| conflict_set.contains(id))
                .cloned()
                .collect();
            for id in conflicting {
                if !order.contains(id) {
                    order.push(id.clone());
                }
            }
            order.insert(0, new.clone());
            return ResolvedOrder {
                order,
                source: OrderSource::Partial,
            };
        }

        // 3. Default: the new package outranks everything it collided with.
        ResolvedOrder {
            order: members,
            source: OrderSource::Default,
        }
    }

    /// Rank an arbitrary claimant set, best-known order first.
    ///
    /// Used by the overlay refresh to pick each path's winner. Falls back
    /// from an exact record through the best partial record to sorted ids,
    /// so the result is deterministic even before any order was confirmed.
    pub fn rank(&self, claimants: &[PackageId]) -> Vec<PackageId> {
        if claimants.len() <= 1 {
            return claimants.to_vec();
        }

        if let Some(order) = self.get_exact(claimants) {
            let mut ranked: Vec<PackageId> = order
                .iter()
                .filter(|id| claimants.contains(id))
                .cloned()
                .collect();
            append_missing_sorted(&mut ranked, claimants);
            return ranked;
        }

        let claimant_set: BTreeSet<&PackageId> = claimants.iter().collect();
        let mut best: Option<(usize, &Vec<PackageId>)> = None;
        for order in self.records.values() {
            let overlap = order.iter().filter(|id| claimant_set.contains(id)).count();
            if overlap >= 2 && best.map_or(true, |(size, _)| overlap > size) {
                best = Some((overlap, order));
            }
        }
        if let Some((_, record)) = best {
            let mut ranked: Vec<PackageId> = record
                .iter()
                .filter(|id| claimant_set.contains(id))
                .cloned()
                .collect();
            append_missing_sorted(&mut ranked, claimants);
            return ranked;
        }

        let mut ranked = claimants.to_vec();
        ranked.sort();
        ranked
    }
}

fn append_missing_sorted(ranked: &mut Vec<PackageId>, claimants: &[PackageId]) {
    let mut missing: Vec<PackageId> = claimants
        .iter()
        .filter(|id| !ranked.contains(id))
        .cloned()
        .collect();
    missing.sort();
    ranked.extend(missing);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> PackageId {
        PackageId::new(s)
    }

    fn ids(names: &[&str]) -> Vec<PackageId> {
        names.iter().map(|n| id(n)).collect()
    }

    #[test]
    fn test_signature_sorts_members() {
        assert_eq!(signature(&ids(&["b", "a", "c"])), "a|b|c");
        assert_eq!(signature(&ids(&["a"])), "a");
    }

    #[test]
    fn test_exact_match_returned_verbatim() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["b", "a"]));

        let resolved = records.resolve_order(&id("a"), &ids(&["b"]));
        assert_eq!(resolved.order, ids(&["b", "a"]));
        assert_eq!(resolved.source, OrderSource::Exact);
    }

    #[test]
    fn test_default_order_puts_new_first() {
        let records = PriorityRecords::new();
        let resolved = records.resolve_order(&id("b"), &ids(&["a"]));

        assert_eq!(resolved.order, ids(&["b", "a"]));
        assert_eq!(resolved.source, OrderSource::Default);
    }

    #[test]
    fn test_partial_match_keeps_relative_order_and_prepends_new() {
        // Stored: {A,B} ordered [A,B]. Enabling C against {A,B} must give
        // [C,A,B].
        let mut records = PriorityRecords::new();
        records.record(ids(&["a", "b"]));

        let resolved = records.resolve_order(&id("c"), &ids(&["b", "a"]));
        assert_eq!(resolved.order, ids(&["c", "a", "b"]));
        assert_eq!(resolved.source, OrderSource::Partial);
    }

    #[test]
    fn test_partial_match_appends_unknown_members() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["a", "b"]));

        // d is in the conflict set but not in the record; it keeps its
        // discovery position after the recorded members.
        let resolved = records.resolve_order(&id("c"), &ids(&["d", "b", "a"]));
        assert_eq!(resolved.order, ids(&["c", "a", "b", "d"]));
        assert_eq!(resolved.source, OrderSource::Partial);
    }

    #[test]
    fn test_partial_match_requires_two_shared_members() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["a", "x"]));

        // Only one member shared with the conflict set: not usable.
        let resolved = records.resolve_order(&id("c"), &ids(&["a", "b"]));
        assert_eq!(resolved.source, OrderSource::Default);
        assert_eq!(resolved.order, ids(&["c", "a", "b"]));
    }

    #[test]
    fn test_partial_match_prefers_larger_intersection() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["a", "b"]));
        records.record(ids(&["b", "a", "d"]));

        let resolved = records.resolve_order(&id("c"), &ids(&["a", "b", "d"]));
        assert_eq!(resolved.order, ids(&["c", "b", "a", "d"]));
        assert_eq!(resolved.source, OrderSource::Partial);
    }

    #[test]
    fn test_override_is_persisted_by_signature() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["b", "a"]));

        // Caller overrides; the record for the same member set is replaced.
        records.record(ids(&["a", "b"]));
        assert_eq!(records.get_exact(&ids(&["a", "b"])).unwrap(), &ids(&["a", "b"])[..]);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_rank_exact_record() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["b", "a"]));

        assert_eq!(records.rank(&ids(&["a", "b"])), ids(&["b", "a"]));
    }

    #[test]
    fn test_rank_without_records_is_sorted() {
        let records = PriorityRecords::new();
        assert_eq!(records.rank(&ids(&["b", "a"])), ids(&["a", "b"]));
    }

    #[test]
    fn test_rank_single_claimant() {
        let records = PriorityRecords::new();
        assert_eq!(records.rank(&ids(&["only"])), ids(&["only"]));
    }

    #[test]
    fn test_rank_partial_record() {
        let mut records = PriorityRecords::new();
        records.record(ids(&["b", "a", "x"]));

        // Claimants {a, b, c}: recorded relative order [b, a] survives,
        // unknown c is appended.
        assert_eq!(records.rank(&ids(&["c", "a", "b"])), ids(&["b", "a", "c"]));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("priorities.json");

        let mut records = PriorityRecords::new();
        records.record(ids(&["b", "a"]));
        records.record(ids(&["c", "a", "d"]));
        records.save(&file).unwrap();

        let loaded = PriorityRecords::load(&file).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = PriorityRecords::load(&dir.path().join("none.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_rejects_newer_schema() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("priorities.json");
        fs::write(
            &file,
            format!(
                r#"{{"schema": {}, "records": {{}}}}"#,
                PRIORITY_SCHEMA_VERSION + 1
            ),
        )
        .unwrap();

        let err = PriorityRecords::load(&file).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchema { .. }));
    }
}
