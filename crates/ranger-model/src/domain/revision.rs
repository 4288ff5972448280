use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A revision label resolved to a sha and a prepared working directory.
///
/// `sha` is the durable identity; `name` is a mutable label that may point at
/// a different sha on the next invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRevision {
    pub name: String,
    pub sha: String,
    pub dir: PathBuf,
}

impl ResolvedRevision {
    pub fn new(name: impl Into<String>, sha: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            sha: sha.into(),
            dir: dir.into(),
        }
    }
}
