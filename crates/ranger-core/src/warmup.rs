//! Discardable pre-iterations that gate broken cells out of a run.
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use ranger_model::CellKey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    CoreError,
    executor::{ExecOutcome, Executor, IterationRequest},
    pool::{IterationTask, WorkerPool},
    progress::{ProgressEvent, ProgressSink},
};

/// Iteration number handed to warmup commands. Never persisted.
pub const WARMUP_ITERATION: u32 = 0;

/// One cell to warm up, with the resources its attempts run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupTask {
    pub cell: CellKey,
    pub sha: String,
    pub chrome_bin: PathBuf,
    pub dir: PathBuf,
}

impl WarmupTask {
    fn request(&self, command: &str) -> IterationRequest {
        IterationRequest {
            command: command.to_string(),
            chrome_bin: self.chrome_bin.clone(),
            version: self.cell.version.clone(),
            revision: self.cell.revision.clone(),
            sha: self.sha.clone(),
            dir: self.dir.clone(),
            iteration: WARMUP_ITERATION,
            extra_env: Vec::new(),
        }
    }
}

/// Distinct cells of `tasks`, in first-seen order.
pub fn warmup_tasks(tasks: &[IterationTask]) -> Vec<WarmupTask> {
    let mut seen = HashSet::new();
    tasks
        .iter()
        .filter(|t| seen.insert(t.slot.cell()))
        .map(|t| WarmupTask {
            cell: t.slot.cell(),
            sha: t.slot.sha.clone(),
            chrome_bin: t.chrome_bin.clone(),
            dir: t.dir.clone(),
        })
        .collect()
}

/// Per-invocation warmup verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Cells whose every attempt exited zero.
    pub passed: Vec<CellKey>,
    /// Cells with the exit code of their first failing attempt.
    pub failed: Vec<(CellKey, i32)>,
}

impl WarmupReport {
    pub fn failed_cells(&self) -> HashSet<CellKey> {
        self.failed.iter().map(|(cell, _)| cell.clone()).collect()
    }

    #[inline]
    pub fn is_failed(&self, cell: &CellKey) -> bool {
        self.failed.iter().any(|(c, _)| c == cell)
    }
}

#[derive(Clone)]
pub struct WarmupContext {
    pub command: String,
    pub executor: Arc<dyn Executor>,
    pub progress: Arc<dyn ProgressSink>,
}

/// Run `count` discardable attempts per task through `pool`.
///
/// The first non-zero exit marks its cell failed; queued attempts for that
/// cell are then skipped while other cells carry on. Outputs are dropped
/// and nothing reaches the result store.
#[instrument(level = "debug", skip_all, fields(cells = tasks.len(), count = count))]
pub async fn run_warmups(
    pool: &WorkerPool,
    tasks: Vec<WarmupTask>,
    count: u32,
    ctx: WarmupContext,
) -> Result<WarmupReport, CoreError> {
    if count == 0 || tasks.is_empty() {
        return Ok(WarmupReport::default());
    }

    let cells: Vec<CellKey> = tasks.iter().map(|t| t.cell.clone()).collect();
    let attempts: Vec<(u32, WarmupTask)> = tasks
        .into_iter()
        .flat_map(|t| (0..count).map(move |attempt| (attempt, t.clone())))
        .collect();

    let failed: Arc<Mutex<HashMap<CellKey, i32>>> = Arc::new(Mutex::new(HashMap::new()));
    let job = {
        let failed = Arc::clone(&failed);
        move |worker: usize, (attempt, task): (u32, WarmupTask), cancel: CancellationToken| {
            let failed = Arc::clone(&failed);
            let ctx = ctx.clone();
            async move {
                if is_marked(&failed, &task.cell) {
                    debug!(target: "ranger.core.warmup", cell = %task.cell, attempt, "cell already failed; attempt skipped");
                    return Ok(());
                }

                let req = task.request(&ctx.command);
                let exit_code = match ctx.executor.execute(&req, &cancel).await {
                    ExecOutcome::Exited(out) if !cancel.is_cancelled() => out.exit_code,
                    _ => return Ok(()),
                };

                if exit_code != 0 {
                    let first = failed
                        .lock()
                        .map(|mut m| {
                            let first = !m.contains_key(&task.cell);
                            m.entry(task.cell.clone()).or_insert(exit_code);
                            first
                        })
                        .unwrap_or(false);
                    if first {
                        warn!(target: "ranger.core.warmup", cell = %task.cell, worker, exit_code, "warmup failed; cell skipped");
                    }
                }
                ctx.progress.emit(&ProgressEvent::WarmupCompleted {
                    cell: task.cell,
                    sha: task.sha,
                    exit_code,
                });
                Ok(())
            }
        }
    };

    pool.dispatch(attempts, job).await?;

    let failed = failed.lock().map(|m| m.clone()).unwrap_or_default();
    let mut report = WarmupReport::default();
    for cell in cells {
        match failed.get(&cell) {
            Some(code) => report.failed.push((cell, *code)),
            None => report.passed.push(cell),
        }
    }
    Ok(report)
}

fn is_marked(failed: &Mutex<HashMap<CellKey, i32>>, cell: &CellKey) -> bool {
    failed.lock().map(|m| m.contains_key(cell)).unwrap_or(false)
}
