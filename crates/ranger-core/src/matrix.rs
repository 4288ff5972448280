//! Slot model: pure functions computing the work matrix.
//!
//! Revision filtering is done by name, resumability matching by sha. A moved
//! branch head therefore never completes old slots; records logged against
//! the previous sha are simply ignored.
use std::collections::{HashMap, HashSet};

use ranger_model::{CellKey, Iteration, ResolvedRevision, RunRecord, Slot};

/// Optional version / revision-name restriction.
///
/// An absent or empty list matches everything; both lists must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    pub versions: Option<Vec<String>>,
    pub revisions: Option<Vec<String>>,
}

impl SlotFilter {
    pub fn new(versions: Option<Vec<String>>, revisions: Option<Vec<String>>) -> Self {
        Self {
            versions: versions.filter(|v| !v.is_empty()),
            revisions: revisions.filter(|r| !r.is_empty()),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_none() && self.revisions.is_none()
    }

    #[inline]
    pub fn matches_version(&self, version: &str) -> bool {
        self.versions
            .as_ref()
            .is_none_or(|vs| vs.iter().any(|v| v == version))
    }

    #[inline]
    pub fn matches_revision(&self, name: &str) -> bool {
        self.revisions
            .as_ref()
            .is_none_or(|rs| rs.iter().any(|r| r == name))
    }

    #[inline]
    pub fn matches(&self, version: &str, revision: &str) -> bool {
        self.matches_version(version) && self.matches_revision(revision)
    }
}

/// Cartesian product `versions × revisions × 0..iterations`.
///
/// Order is version-major, then revision, then iteration ascending.
pub fn full_matrix(
    versions: &[String],
    revisions: &[ResolvedRevision],
    iterations: Iteration,
) -> Vec<Slot> {
    let mut slots =
        Vec::with_capacity(versions.len() * revisions.len() * iterations as usize);
    for version in versions {
        for rev in revisions {
            for i in 0..iterations {
                slots.push(Slot::new(version, &rev.name, &rev.sha, i));
            }
        }
    }
    slots
}

/// Slots of `matrix` not satisfied by a successful record, in matrix order.
pub fn pending(matrix: Vec<Slot>, history: &[RunRecord]) -> Vec<Slot> {
    let satisfied: HashSet<(&str, &str, Iteration)> = history
        .iter()
        .filter(|r| r.is_success())
        .map(|r| (r.version.as_str(), r.sha.as_str(), r.iteration))
        .collect();

    matrix
        .into_iter()
        .filter(|s| !satisfied.contains(&(s.version.as_str(), s.sha.as_str(), s.iteration)))
        .collect()
}

/// `count` fresh slots per surviving cell, numbered after the highest
/// recorded iteration of that `(version, sha)`.
///
/// Numbering ignores exit codes: failed attempts still advance the counter.
pub fn append(
    versions: &[String],
    revisions: &[ResolvedRevision],
    history: &[RunRecord],
    count: Iteration,
    filter: &SlotFilter,
) -> Vec<Slot> {
    let mut max_seen: HashMap<(&str, &str), Iteration> = HashMap::new();
    for r in history {
        max_seen
            .entry((r.version.as_str(), r.sha.as_str()))
            .and_modify(|m| *m = (*m).max(r.iteration))
            .or_insert(r.iteration);
    }

    let mut slots = Vec::new();
    for version in versions.iter().filter(|v| filter.matches_version(v)) {
        for rev in revisions.iter().filter(|r| filter.matches_revision(&r.name)) {
            let start = max_seen
                .get(&(version.as_str(), rev.sha.as_str()))
                .map_or(0, |m| m + 1);
            for i in start..start + count {
                slots.push(Slot::new(version, &rev.name, &rev.sha, i));
            }
        }
    }
    slots
}

/// Keep slots matching `filter`, preserving order.
pub fn filter(matrix: Vec<Slot>, filter: &SlotFilter) -> Vec<Slot> {
    if filter.is_empty() {
        return matrix;
    }
    matrix
        .into_iter()
        .filter(|s| filter.matches(&s.version, &s.revision))
        .collect()
}

/// Completion of one `(version, revision)` cell at its current sha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellStatus {
    pub cell: CellKey,
    pub sha: String,
    pub target: Iteration,
    /// Slots in `0..target` satisfied by a successful record.
    pub succeeded: usize,
    /// Records with a non-zero exit code, any iteration.
    pub failed: usize,
}

impl CellStatus {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.succeeded >= self.target as usize
    }
}

/// Per-cell completion for `versions × revisions`, revisions given as
/// `(name, sha)` pairs. Version-major order.
pub fn cell_status(
    versions: &[String],
    revisions: &[(String, String)],
    history: &[RunRecord],
    target: Iteration,
) -> Vec<CellStatus> {
    let mut out = Vec::with_capacity(versions.len() * revisions.len());
    for version in versions {
        for (name, sha) in revisions {
            let records = history
                .iter()
                .filter(|r| &r.version == version && &r.sha == sha);
            let mut satisfied = HashSet::new();
            let mut failed = 0;
            for r in records {
                if r.is_success() {
                    if r.iteration < target {
                        satisfied.insert(r.iteration);
                    }
                } else {
                    failed += 1;
                }
            }
            out.push(CellStatus {
                cell: CellKey::new(version, name),
                sha: sha.clone(),
                target,
                succeeded: satisfied.len(),
                failed,
            });
        }
    }
    out
}
