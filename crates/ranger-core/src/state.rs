use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".chrome-ranger";

const LOCK_FILE: &str = "lock";
const RUNS_FILE: &str = "runs.jsonl";
const OUTPUT_DIR: &str = "output";
const WORKTREES_DIR: &str = "worktrees";

/// Layout of `<project>/.chrome-ranger/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// State directory of the project rooted at `project`.
    pub fn for_project(project: impl AsRef<Path>) -> Self {
        Self::new(project.as_ref().join(STATE_DIR))
    }

    /// Use `root` directly as the state directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    #[inline]
    pub fn runs_path(&self) -> PathBuf {
        self.root.join(RUNS_FILE)
    }

    #[inline]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    #[inline]
    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join(WORKTREES_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let state = StateDir::for_project("/proj");
        assert_eq!(state.root(), Path::new("/proj/.chrome-ranger"));
        assert_eq!(state.lock_path(), Path::new("/proj/.chrome-ranger/lock"));
        assert_eq!(state.runs_path(), Path::new("/proj/.chrome-ranger/runs.jsonl"));
        assert_eq!(state.output_dir(), Path::new("/proj/.chrome-ranger/output"));
        assert_eq!(
            state.worktrees_dir(),
            Path::new("/proj/.chrome-ranger/worktrees")
        );
    }
}
