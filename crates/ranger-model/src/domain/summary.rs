use serde::{Deserialize, Serialize};

use super::CellKey;

/// Aggregate outcome of one worker pool pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Number of tasks handed to the pool.
    pub total: usize,
    /// Attempts that finished and were recorded, failed ones included.
    pub completed: usize,
    /// Recorded attempts with a non-zero exit code.
    pub failed: usize,
}

impl PoolSummary {
    #[inline]
    pub fn succeeded(&self) -> usize {
        self.completed.saturating_sub(self.failed)
    }
}

/// Outcome of one `run` invocation, consumed by the CLI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Revisions skipped because resolution, checkout or setup failed.
    pub skipped_refs: Vec<String>,
    /// Versions without a usable browser binary.
    pub skipped_versions: Vec<String>,
    /// Cells gated out by a failing warmup.
    pub failed_cells: Vec<CellKey>,
}

impl RunSummary {
    /// Fold pool totals into this summary.
    pub fn with_pool(mut self, pool: PoolSummary) -> Self {
        self.total = pool.total;
        self.completed = pool.completed;
        self.failed = pool.failed;
        self
    }

    /// Returns `true` if nothing was executed.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.total == 0
    }
}
