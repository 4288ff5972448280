use thiserror::Error;

use crate::{config::ConfigError, lock::LockError, store::StoreError};

/// Errors that abort a whole invocation.
///
/// Cell-scoped and iteration-scoped failures never surface here; they are
/// converted into skip-set entries or run records where they happen.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no browser binary could be provisioned")]
    NoBinaries,
    #[error("worker failed: {0}")]
    Worker(String),
    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// Returns `true` if the invocation stopped because of an external signal.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}
