//! Collaborator seams consumed by the coordinator.
//!
//! Every failure here is cell-scoped: the coordinator skips the affected
//! revision or version and carries on with the rest.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("git ref not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to prepare working directory for {name}: {reason}")]
pub struct PrepareError {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("chrome {version} is not installed under {}", dir.display())]
    NotInstalled { version: String, dir: PathBuf },
    #[error("failed to provision chrome {version}: {reason}")]
    Failed { version: String, reason: String },
}

/// Outcome of a one-time setup command for a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A marker for the same sha was found; nothing ran.
    Cached,
    Succeeded { duration_ms: u64 },
    Failed { exit_code: i32 },
    /// Cancellation arrived first; the command was terminated and no marker written.
    Cancelled,
}

impl SetupOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, SetupOutcome::Cached | SetupOutcome::Succeeded { .. })
    }
}

/// Maps revision labels to shas and prepares their working directories.
#[async_trait]
pub trait RevisionResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, ResolveError>;

    /// Idempotent; reuses an existing checkout at the matching sha.
    async fn prepare(&self, name: &str, sha: &str) -> Result<PathBuf, PrepareError>;
}

/// Locates (or acquires) a browser executable for a version.
#[async_trait]
pub trait BinaryProvisioner: Send + Sync {
    async fn ensure(&self, version: &str) -> Result<PathBuf, ProvisionError>;
}

/// Runs the configured setup command at most once per `(dir, sha)`.
#[async_trait]
pub trait SetupRunner: Send + Sync {
    /// Terminates the command if `cancel` fires.
    async fn run_once(&self, command: &str, dir: &Path, sha: &str, cancel: &CancellationToken) -> SetupOutcome;
}
