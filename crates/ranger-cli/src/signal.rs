//! OS signals to cancellation.
//!
//! The first SIGINT / SIGTERM cancels the run; workers stop and the lock is
//! released on the normal return path. A second one kills every tracked
//! command group, removes a lock this process still owns and exits at once.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use ranger_core::lock;
use ranger_exec::ProcessGroups;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{EXIT_INTERRUPTED, EXIT_TERMINATED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// SIGINT / Ctrl-C.
    Int,
    /// SIGTERM.
    Term,
}

impl Interrupt {
    pub fn exit_code(self) -> u8 {
        match self {
            Interrupt::Int => EXIT_INTERRUPTED,
            Interrupt::Term => EXIT_TERMINATED,
        }
    }
}

pub struct Watcher {
    handle: JoinHandle<()>,
    first: Arc<OnceLock<Interrupt>>,
}

impl Watcher {
    /// Exit status for a run this watcher cancelled.
    pub fn exit_code(&self) -> u8 {
        self.first
            .get()
            .copied()
            .unwrap_or(Interrupt::Int)
            .exit_code()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

pub fn watch(cancel: CancellationToken, lock_path: PathBuf, groups: ProcessGroups) -> Watcher {
    let first = Arc::new(OnceLock::new());
    let seen = Arc::clone(&first);
    let handle = tokio::spawn(async move {
        let Ok(signal) = interrupted().await else {
            return;
        };
        let _ = seen.set(signal);
        warn!("interrupt received; stopping (press Ctrl-C again to force)");
        cancel.cancel();

        let Ok(signal) = interrupted().await else {
            return;
        };
        let killed = groups.kill_all();
        warn!(killed, "second interrupt; killing running commands");
        release_owned(&lock_path);
        std::process::exit(i32::from(signal.exit_code()));
    });
    Watcher { handle, first }
}

#[cfg(target_family = "unix")]
async fn interrupted() -> std::io::Result<Interrupt> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.map(|_| Interrupt::Int),
        _ = term.recv() => Ok(Interrupt::Term),
    }
}

#[cfg(not(target_family = "unix"))]
async fn interrupted() -> std::io::Result<Interrupt> {
    tokio::signal::ctrl_c().await.map(|_| Interrupt::Int)
}

fn release_owned(path: &Path) {
    let owned = std::fs::read_to_string(path)
        .map(|content| content.trim() == std::process::id().to_string())
        .unwrap_or(false);
    if owned && let Err(e) = lock::release(path) {
        warn!(error = %e, "failed to release lock");
    }
}
