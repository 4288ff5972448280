use serde::{Deserialize, Serialize};

use crate::{Iteration, Version};

/// One addressable unit of work.
///
/// Identity is `(version, sha, iteration)`. The revision `name` travels along
/// for filtering and display only: two slots with the same sha but different
/// names are the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Browser version.
    pub version: Version,
    /// Human-facing revision label (branch, tag, ...).
    pub revision: String,
    /// Resolved commit sha; the durable identity of the revision.
    pub sha: String,
    /// Iteration index within the cell.
    pub iteration: Iteration,
}

impl Slot {
    pub fn new(
        version: impl Into<String>,
        revision: impl Into<String>,
        sha: impl Into<String>,
        iteration: Iteration,
    ) -> Self {
        Self {
            version: version.into(),
            revision: revision.into(),
            sha: sha.into(),
            iteration,
        }
    }

    /// Key of the warmup cell this slot belongs to.
    #[inline]
    pub fn cell(&self) -> CellKey {
        CellKey::new(&self.version, &self.revision)
    }

    /// Short sha used in log lines.
    #[inline]
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }

    /// Major component of the version (`"120.0.1"` -> `"120"`).
    #[inline]
    pub fn major(&self) -> &str {
        self.version.split('.').next().unwrap_or(&self.version)
    }
}

/// `(version, revision name)` pair used to gate slots after warmup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub version: Version,
    pub revision: String,
}

impl CellKey {
    pub fn new(version: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            revision: revision.into(),
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chrome@{} × {}", self.version, self.revision)
    }
}
