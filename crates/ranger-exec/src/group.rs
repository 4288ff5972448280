//! Registry of live process groups spawned by this process.
//!
//! Commands run in their own process group, so terminal signals never reach
//! them. Whoever exits the process early calls [`ProcessGroups::kill_all`].
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ProcessGroups {
    inner: Arc<Mutex<HashSet<u32>>>,
}

/// Keeps a group registered until dropped.
#[derive(Debug)]
pub struct TrackedGroup {
    groups: ProcessGroups,
    pgid: u32,
}

impl TrackedGroup {
    #[inline]
    pub fn pgid(&self) -> u32 {
        self.pgid
    }
}

impl Drop for TrackedGroup {
    fn drop(&mut self) {
        self.groups.set().remove(&self.pgid);
    }
}

impl ProcessGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> std::sync::MutexGuard<'_, HashSet<u32>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the group led by `pid`.
    pub fn track(&self, pid: u32) -> TrackedGroup {
        self.set().insert(pid);
        TrackedGroup {
            groups: self.clone(),
            pgid: pid,
        }
    }

    pub fn len(&self) -> usize {
        self.set().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SIGKILL every registered group. Returns how many were signalled.
    pub fn kill_all(&self) -> usize {
        let groups: Vec<u32> = self.set().iter().copied().collect();
        for pgid in &groups {
            debug!(target: "ranger.exec.group", pgid, "killing process group");
            crate::util::kill_group(*pgid);
        }
        groups.len()
    }
}
