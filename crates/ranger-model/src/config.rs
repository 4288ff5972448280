use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Validated project configuration (`chrome-ranger.yaml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Shell command executed once per iteration.
    pub command: String,
    /// Optional one-time command run in each revision's working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    /// Iterations per `(version, revision)` cell.
    pub iterations: u32,
    /// Discardable attempts per cell before real iterations.
    #[serde(default)]
    pub warmup: u32,
    /// Concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub chrome: ChromeConfig,
    pub code: CodeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeConfig {
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Repository path, relative to the project directory.
    pub repo: PathBuf,
    /// Revision names (branches, tags, shas).
    pub refs: Vec<String>,
}

fn default_workers() -> usize {
    1
}
