//! Progress events emitted to a display layer.
use std::sync::Mutex;

use ranger_model::{CellKey, PoolSummary, Slot};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    IterationStarted {
        worker: usize,
        slot: Slot,
    },
    IterationCompleted {
        worker: usize,
        slot: Slot,
        exit_code: i32,
        duration_ms: u64,
        /// Recorded attempts so far, this one included.
        done: usize,
        total: usize,
    },
    WarmupCompleted {
        cell: CellKey,
        sha: String,
        exit_code: i32,
    },
    RunCompleted {
        summary: PoolSummary,
        elapsed_ms: u64,
    },
}

/// Consumer of progress events. Called concurrently from every worker.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Renders events as `tracing` lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::IterationStarted { .. } => {}
            ProgressEvent::IterationCompleted {
                slot,
                exit_code,
                duration_ms,
                done,
                total,
                ..
            } => {
                let pad = total.to_string().len();
                info!(
                    target: "ranger.progress",
                    "[{done:>pad$}/{total}] chrome@{} × {} ({}) #{}    {duration_ms}ms  exit:{exit_code}",
                    slot.major(),
                    slot.revision,
                    slot.short_sha(),
                    slot.iteration,
                );
            }
            ProgressEvent::WarmupCompleted {
                cell,
                sha,
                exit_code,
            } => {
                let short = &sha[..sha.len().min(7)];
                if *exit_code == 0 {
                    info!(target: "ranger.progress", "[warmup] {cell} ({short}) ok");
                } else {
                    warn!(target: "ranger.progress", "[warmup] {cell} ({short}) exit:{exit_code}");
                }
            }
            ProgressEvent::RunCompleted {
                summary,
                elapsed_ms,
            } => {
                info!(
                    target: "ranger.progress",
                    completed = summary.completed,
                    failed = summary.failed,
                    elapsed_ms,
                    "run completed"
                );
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Keeps every event in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct CollectProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for CollectProgress {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
