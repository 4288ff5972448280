//! Bounded worker pool shared by the warmup and iteration phases.
//!
//! `min(W, tasks)` workers pull from one shared cursor, so each task runs
//! exactly once. Dispatching stops as soon as the cancellation token fires
//! or a worker reports a fatal error.
use std::{
    future::Future,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use ranger_model::{PoolSummary, RunRecord, Slot};
use time::{OffsetDateTime, macros::format_description};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};
use uuid::Uuid;

use crate::{
    CoreError,
    executor::{ExecOutcome, Executor, IterationRequest},
    progress::{ProgressEvent, ProgressSink},
    store::RecordWriter,
};

/// One real iteration: a slot plus the resources it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationTask {
    pub slot: Slot,
    pub chrome_bin: PathBuf,
    pub dir: PathBuf,
}

impl IterationTask {
    pub fn request(&self, command: &str) -> IterationRequest {
        IterationRequest {
            command: command.to_string(),
            chrome_bin: self.chrome_bin.clone(),
            version: self.slot.version.clone(),
            revision: self.slot.revision.clone(),
            sha: self.slot.sha.clone(),
            dir: self.dir.clone(),
            iteration: self.slot.iteration,
            extra_env: Vec::new(),
        }
    }
}

/// Shared collaborators of the iteration phase.
#[derive(Clone)]
pub struct IterationContext {
    pub command: String,
    pub executor: Arc<dyn Executor>,
    pub writer: Arc<RecordWriter>,
    pub progress: Arc<dyn ProgressSink>,
}

#[derive(Debug)]
pub struct WorkerPool {
    workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Pool of `workers` (at least one) observing `cancel`.
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            cancel,
        }
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `job` once per task on up to `workers` concurrent workers.
    ///
    /// `job` receives the worker index, the task, and a token that fires on
    /// external cancellation or after another worker failed. The first job
    /// error stops dispatching and is returned once every worker has exited.
    pub async fn dispatch<T, F, Fut>(&self, tasks: Vec<T>, job: F) -> Result<(), CoreError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(usize, T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(());
        }

        let n = self.workers.min(tasks.len());
        let tasks = Arc::new(tasks);
        let cursor = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(job);
        let stop = self.cancel.child_token();

        let mut set = JoinSet::new();
        for worker in 1..=n {
            let tasks = Arc::clone(&tasks);
            let cursor = Arc::clone(&cursor);
            let job = Arc::clone(&job);
            let stop = stop.clone();

            set.spawn(async move {
                loop {
                    if stop.is_cancelled() {
                        trace!(target: "ranger.core.pool", worker, "stop requested");
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(index) else {
                        break;
                    };
                    if let Err(e) = job(worker, task.clone(), stop.clone()).await {
                        stop.cancel();
                        return Err(e);
                    }
                }
                Ok(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => CoreError::Worker(e.to_string()),
            };
            error!(target: "ranger.core.pool", error = %err, "worker aborted");
            stop.cancel();
            first_error.get_or_insert(err);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Execute real iterations, recording every completed attempt.
    ///
    /// For each completion the worker writes both output blobs, appends the
    /// record through the shared writer, then emits progress. Attempts cut
    /// short by cancellation leave no trace in the store.
    #[instrument(level = "debug", skip_all, fields(tasks = tasks.len(), workers = self.workers))]
    pub async fn run_iterations(
        &self,
        tasks: Vec<IterationTask>,
        ctx: IterationContext,
    ) -> Result<PoolSummary, CoreError> {
        let total = tasks.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let job = {
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            let ctx = ctx.clone();
            move |worker: usize, task: IterationTask, cancel: CancellationToken| {
                let completed = Arc::clone(&completed);
                let failed = Arc::clone(&failed);
                let ctx = ctx.clone();
                async move {
                    let id = Uuid::new_v4().to_string();
                    let timestamp = now_iso8601();
                    ctx.progress.emit(&ProgressEvent::IterationStarted {
                        worker,
                        slot: task.slot.clone(),
                    });

                    let req = task.request(&ctx.command);
                    let out = match ctx.executor.execute(&req, &cancel).await {
                        ExecOutcome::Exited(out) if !cancel.is_cancelled() => out,
                        _ => {
                            debug!(target: "ranger.core.pool", worker, iteration = task.slot.iteration, "iteration interrupted; not recorded");
                            return Ok(());
                        }
                    };

                    ctx.writer.write_outputs(&id, &out.stdout, &out.stderr)?;
                    let record = RunRecord {
                        id,
                        version: task.slot.version.clone(),
                        revision: task.slot.revision.clone(),
                        sha: task.slot.sha.clone(),
                        iteration: task.slot.iteration,
                        timestamp,
                        duration_ms: out.duration_ms,
                        exit_code: out.exit_code,
                    };
                    ctx.writer.append(&record).await?;

                    if !out.is_success() {
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.progress.emit(&ProgressEvent::IterationCompleted {
                        worker,
                        slot: task.slot,
                        exit_code: out.exit_code,
                        duration_ms: out.duration_ms,
                        done,
                        total,
                    });
                    Ok(())
                }
            }
        };

        self.dispatch(tasks, job).await?;

        let summary = PoolSummary {
            total,
            completed: completed.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        ctx.progress.emit(&ProgressEvent::RunCompleted {
            summary,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        Ok(summary)
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_iso8601() -> String {
    let fmt = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    OffsetDateTime::now_utc()
        .format(&fmt)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}
