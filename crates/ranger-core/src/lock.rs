//! Process-level single-instance lock.
//!
//! The lock file holds the decimal pid of its owner. Creation goes through a
//! hard link of a fully written temp file, so a lock is never observable
//! half-written by a live owner.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on create attempts; one reclaim almost always suffices.
pub const MAX_ACQUIRE_ATTEMPTS: usize = 4;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another chrome-ranger process (PID {pid}) is running against this project. If this is wrong, remove {}",
        path.display()
    )]
    Held { pid: u32, path: PathBuf },
    #[error("lock {} kept reappearing after reclaim", path.display())]
    Contended { path: PathBuf },
    #[error("lock io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Owner of an existing lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOwner {
    /// Numeric pid of a live process.
    Held(u32),
    /// Empty, non-numeric, or a pid with no live process.
    Stale,
}

/// Classify lock file content, probing liveness of a parsed pid.
pub fn classify(content: &str) -> LockOwner {
    classify_with(content, is_pid_alive)
}

fn classify_with(content: &str, alive: impl Fn(u32) -> bool) -> LockOwner {
    match content.trim().parse::<u32>() {
        Ok(pid) if alive(pid) => LockOwner::Held(pid),
        _ => LockOwner::Stale,
    }
}

/// Exclusive ownership of a lock file; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly, surfacing unlink errors.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        release(&self.path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = release(&self.path)
        {
            warn!(target: "ranger.core.lock", error = %e, "failed to release lock");
        }
    }
}

/// Acquire the lock at `path` for the current process.
///
/// Creates parent directories. A stale lock is moved aside and creation
/// retried, at most [`MAX_ACQUIRE_ATTEMPTS`] times.
pub fn acquire(path: &Path) -> Result<LockGuard, LockError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
    }
    let pid = std::process::id();

    for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
        match create_exclusive(path, pid) {
            Ok(()) => {
                debug!(target: "ranger.core.lock", pid, attempt, path = %path.display(), "lock acquired");
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                    released: false,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LockError::io(path, e)),
        }

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            // owner released between our create and read
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(LockError::io(path, e)),
        };

        match classify(&content) {
            LockOwner::Held(owner) => {
                return Err(LockError::Held {
                    pid: owner,
                    path: path.to_path_buf(),
                });
            }
            LockOwner::Stale => {
                warn!(
                    target: "ranger.core.lock",
                    content = content.trim(),
                    path = %path.display(),
                    "reclaiming stale lock"
                );
                reclaim(path, &content, pid)?;
            }
        }
    }

    Err(LockError::Contended {
        path: path.to_path_buf(),
    })
}

/// Move the stale lock whose content was `seen` out of the way.
///
/// The rename is atomic, so at most one reclaimer takes a given file. If the
/// file taken is no longer the stale one, another process created a fresh
/// lock in between and it is linked back before anyone else can claim it.
fn reclaim(path: &Path, seen: &str, pid: u32) -> Result<(), LockError> {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("lock");
    let aside = path.with_file_name(format!(".{name}.{pid}.stale"));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LockError::io(path, e)),
    }

    let taken = fs::read_to_string(&aside).unwrap_or_default();
    let restored = if taken == seen {
        Ok(())
    } else {
        debug!(target: "ranger.core.lock", path = %path.display(), "lock changed during reclaim; restoring");
        fs::hard_link(&aside, path)
    };
    let _ = fs::remove_file(&aside);
    match restored {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Remove the lock file. Absence is success.
pub fn release(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: "ranger.core.lock", path = %path.display(), "lock released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Atomically create `path` already containing `pid`, or fail with `AlreadyExists`.
fn create_exclusive(path: &Path, pid: u32) -> io::Result<()> {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("lock");
    let tmp = path.with_file_name(format!(".{name}.{pid}.tmp"));
    fs::write(&tmp, format!("{pid}\n"))?;

    let linked = match fs::hard_link(&tmp, path) {
        Err(e) if e.kind() == io::ErrorKind::Unsupported => create_new(path, pid),
        other => other,
    };
    let _ = fs::remove_file(&tmp);
    linked
}

fn create_new(path: &Path, pid: u32) -> io::Result<()> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(format!("{pid}\n").as_bytes())
}

/// Zero-effect existence check (`kill(pid, 0)`).
///
/// `EPERM` means the process exists but belongs to someone else.
#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs error checking only; nothing is delivered.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_pid_alive(pid: u32) -> bool {
    pid != 0
}
