//! One `run` invocation, end to end.
//!
//! The coordinator holds the project lock for the whole invocation and walks
//! a fixed phase sequence: resolve work, warm up, execute. Cell-scoped
//! failures shrink the work set and are reported in the [`RunSummary`];
//! only orchestration failures are returned as errors.
use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use ranger_model::{Config, PoolSummary, ResolvedRevision, RunRecord, RunSummary, Slot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    CoreError,
    collab::{BinaryProvisioner, RevisionResolver, SetupOutcome, SetupRunner},
    executor::Executor,
    lock,
    matrix::{self, SlotFilter},
    pool::{IterationContext, IterationTask, WorkerPool},
    progress::{LogProgress, ProgressSink},
    state::StateDir,
    store::{RecordWriter, ResultStore},
    warmup::{self, WarmupContext},
};

/// How pending work is derived from history. Modes are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Fill in every unsatisfied slot of the configured matrix.
    #[default]
    Resume,
    /// Add this many iterations after the highest recorded one per cell.
    Append(u32),
    /// Delete the targeted cells' records, then run the full matrix.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub filter: SlotFilter,
}

impl RunRequest {
    pub fn new(mode: RunMode, filter: SlotFilter) -> Self {
        Self { mode, filter }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Locked,
    ResolvingWork,
    Warmup,
    Executing,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Locked => "locked",
            Phase::ResolvingWork => "resolving-work",
            Phase::Warmup => "warmup",
            Phase::Executing => "executing",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        })
    }
}

/// Revisions and binaries that survived the preparation phase.
#[derive(Debug, Default)]
struct Workspace {
    versions: Vec<String>,
    revisions: Vec<ResolvedRevision>,
    binaries: HashMap<String, PathBuf>,
}

pub struct Coordinator {
    config: Config,
    state: StateDir,
    resolver: Arc<dyn RevisionResolver>,
    provisioner: Arc<dyn BinaryProvisioner>,
    setup: Option<Arc<dyn SetupRunner>>,
    executor: Arc<dyn Executor>,
    progress: Arc<dyn ProgressSink>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        state: StateDir,
        resolver: Arc<dyn RevisionResolver>,
        provisioner: Arc<dyn BinaryProvisioner>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            config,
            state,
            resolver,
            provisioner,
            setup: None,
            executor,
            progress: Arc::new(LogProgress),
        }
    }

    /// Runner for the configured `setup` command. Ignored when none is set.
    pub fn with_setup(mut self, setup: Arc<dyn SetupRunner>) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[inline]
    pub fn state(&self) -> &StateDir {
        &self.state
    }

    /// Execute one invocation under the project lock.
    ///
    /// The lock is released on every exit path. Cancellation stops dispatch,
    /// terminates in-flight commands and yields [`CoreError::Cancelled`];
    /// iterations that completed before it stay recorded.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunSummary, CoreError> {
        let guard = lock::acquire(&self.state.lock_path())?;
        enter(Phase::Locked);

        let result = self.run_locked(request, &cancel).await;
        match &result {
            Ok(_) => enter(Phase::Done),
            Err(e) => {
                enter(Phase::Aborted);
                debug!(target: "ranger.core.coordinator", error = %e, "run aborted");
            }
        }

        if let Err(e) = guard.release() {
            warn!(target: "ranger.core.coordinator", error = %e, "failed to release lock");
        }
        result
    }

    async fn run_locked(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, CoreError> {
        enter(Phase::ResolvingWork);
        let mut summary = RunSummary::default();

        let ws = self.prepare(&request.filter, &mut summary, cancel).await?;
        if ws.versions.is_empty() || ws.revisions.is_empty() {
            info!(target: "ranger.core.coordinator", "no runnable cells");
            return Ok(summary);
        }

        let store = ResultStore::new(self.state.clone());
        let slots = self.pending(request.mode, &ws, &store)?;
        if slots.is_empty() {
            info!(target: "ranger.core.coordinator", "no pending iterations");
            return Ok(summary);
        }
        check(cancel)?;

        let mut tasks = attach(slots, &ws);
        let pool = WorkerPool::new(self.config.workers, cancel.clone());
        info!(
            target: "ranger.core.coordinator",
            iterations = tasks.len(),
            warmup = self.config.warmup,
            workers = pool.workers(),
            "starting run"
        );

        if self.config.warmup > 0 {
            enter(Phase::Warmup);
            let report = warmup::run_warmups(
                &pool,
                warmup::warmup_tasks(&tasks),
                self.config.warmup,
                WarmupContext {
                    command: self.config.command.clone(),
                    executor: Arc::clone(&self.executor),
                    progress: Arc::clone(&self.progress),
                },
            )
            .await?;
            check(cancel)?;

            let failed = report.failed_cells();
            tasks.retain(|t| !failed.contains(&t.slot.cell()));
            summary.failed_cells = report.failed.into_iter().map(|(cell, _)| cell).collect();
            if tasks.is_empty() {
                info!(target: "ranger.core.coordinator", "no iterations left after warmup");
                return Ok(summary);
            }
        }

        enter(Phase::Executing);
        let pool_summary: PoolSummary = pool
            .run_iterations(
                tasks,
                IterationContext {
                    command: self.config.command.clone(),
                    executor: Arc::clone(&self.executor),
                    writer: Arc::new(RecordWriter::new(store)),
                    progress: Arc::clone(&self.progress),
                },
            )
            .await?;
        check(cancel)?;

        Ok(summary.with_pool(pool_summary))
    }

    /// Resolve, check out and set up revisions, then provision binaries.
    ///
    /// Every failure here is cell-scoped and recorded in `summary`.
    async fn prepare(
        &self,
        filter: &SlotFilter,
        summary: &mut RunSummary,
        cancel: &CancellationToken,
    ) -> Result<Workspace, CoreError> {
        let versions: Vec<&String> = self
            .config
            .chrome
            .versions
            .iter()
            .filter(|v| filter.matches_version(v))
            .collect();
        let refs: Vec<&String> = self
            .config
            .code
            .refs
            .iter()
            .filter(|r| filter.matches_revision(r))
            .collect();

        let mut ws = Workspace::default();
        for name in refs {
            check(cancel)?;
            match self.prepare_revision(name).await {
                Some(rev) => ws.revisions.push(rev),
                None => summary.skipped_refs.push(name.clone()),
            }
        }

        if let (Some(command), Some(runner)) = (self.config.setup.as_deref(), self.setup.as_ref()) {
            let mut kept = Vec::with_capacity(ws.revisions.len());
            for rev in ws.revisions.drain(..) {
                check(cancel)?;
                match runner.run_once(command, &rev.dir, &rev.sha, cancel).await {
                    SetupOutcome::Cached => {
                        debug!(target: "ranger.core.coordinator", revision = %rev.name, "setup cached");
                        kept.push(rev);
                    }
                    SetupOutcome::Succeeded { duration_ms } => {
                        info!(target: "ranger.core.coordinator", revision = %rev.name, duration_ms, "setup done");
                        kept.push(rev);
                    }
                    SetupOutcome::Failed { exit_code } => {
                        warn!(target: "ranger.core.coordinator", revision = %rev.name, exit_code, "setup failed; skipping revision");
                        summary.skipped_refs.push(rev.name);
                    }
                    SetupOutcome::Cancelled => return Err(CoreError::Cancelled),
                }
            }
            ws.revisions = kept;
        }

        let wanted = versions.len();
        for version in versions {
            check(cancel)?;
            match self.provisioner.ensure(version).await {
                Ok(bin) => {
                    debug!(target: "ranger.core.coordinator", %version, bin = %bin.display(), "binary ready");
                    ws.binaries.insert(version.clone(), bin);
                    ws.versions.push(version.clone());
                }
                Err(e) => {
                    warn!(target: "ranger.core.coordinator", %version, error = %e, "skipping version");
                    summary.skipped_versions.push(version.clone());
                }
            }
        }
        if wanted > 0 && ws.versions.is_empty() {
            return Err(CoreError::NoBinaries);
        }
        Ok(ws)
    }

    async fn prepare_revision(&self, name: &str) -> Option<ResolvedRevision> {
        let sha = match self.resolver.resolve(name).await {
            Ok(sha) => sha,
            Err(e) => {
                warn!(target: "ranger.core.coordinator", revision = %name, error = %e, "skipping revision");
                return None;
            }
        };
        match self.resolver.prepare(name, &sha).await {
            Ok(dir) => {
                info!(target: "ranger.core.coordinator", revision = %name, sha = %short(&sha), dir = %dir.display(), "revision ready");
                Some(ResolvedRevision::new(name, sha, dir))
            }
            Err(e) => {
                warn!(target: "ranger.core.coordinator", revision = %name, error = %e, "skipping revision");
                None
            }
        }
    }

    /// Pending slots for `mode` over the surviving workspace.
    fn pending(&self, mode: RunMode, ws: &Workspace, store: &ResultStore) -> Result<Vec<Slot>, CoreError> {
        let iterations = self.config.iterations;
        let slots = match mode {
            RunMode::Resume => {
                let history = store.load()?;
                matrix::pending(matrix::full_matrix(&ws.versions, &ws.revisions, iterations), &history)
            }
            RunMode::Append(count) => {
                let history = store.load()?;
                matrix::append(&ws.versions, &ws.revisions, &history, count, &SlotFilter::default())
            }
            RunMode::Replace => {
                let versions: HashSet<&str> = ws.versions.iter().map(String::as_str).collect();
                let names: HashSet<&str> = ws.revisions.iter().map(|r| r.name.as_str()).collect();
                let deletion = store.delete_where(|r: &RunRecord| {
                    versions.contains(r.version.as_str()) && names.contains(r.revision.as_str())
                })?;
                info!(target: "ranger.core.coordinator", removed = deletion.removed.len(), "replaced targeted records");
                matrix::pending(matrix::full_matrix(&ws.versions, &ws.revisions, iterations), &deletion.kept)
            }
        };
        Ok(slots)
    }
}

/// Pair each slot with its binary and working directory.
fn attach(slots: Vec<Slot>, ws: &Workspace) -> Vec<IterationTask> {
    let dirs: HashMap<&str, &PathBuf> = ws.revisions.iter().map(|r| (r.name.as_str(), &r.dir)).collect();
    slots
        .into_iter()
        .filter_map(|slot| {
            let chrome_bin = ws.binaries.get(&slot.version)?.clone();
            let dir = (*dirs.get(slot.revision.as_str())?).clone();
            Some(IterationTask { slot, chrome_bin, dir })
        })
        .collect()
}

fn check(cancel: &CancellationToken) -> Result<(), CoreError> {
    if cancel.is_cancelled() {
        Err(CoreError::Cancelled)
    } else {
        Ok(())
    }
}

fn enter(phase: Phase) {
    debug!(target: "ranger.core.coordinator", %phase, "phase");
}

fn short(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
