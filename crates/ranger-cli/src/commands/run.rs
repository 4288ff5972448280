use std::{path::Path, process::ExitCode, sync::Arc};

use ranger_core::Coordinator;
use ranger_exec::{CacheProvisioner, GitResolver, ProcessGroups, ShellExecutor, ShellSetupRunner};
use ranger_model::RunSummary;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{cli::RunArgs, project::Project, signal};

pub async fn run(project: &Path, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let project = Project::load(project)?;
    let resolver = GitResolver::new(&project.config.code.repo, project.state.worktrees_dir());
    let provisioner = CacheProvisioner::new(project.cache_dir());
    let groups = ProcessGroups::new();

    let coordinator = Coordinator::new(
        project.config.clone(),
        project.state.clone(),
        Arc::new(resolver),
        Arc::new(provisioner),
        Arc::new(ShellExecutor::new().with_groups(groups.clone())),
    )
    .with_setup(Arc::new(ShellSetupRunner::new().with_groups(groups.clone())));

    let cancel = CancellationToken::new();
    let watcher = signal::watch(cancel.clone(), project.state.lock_path(), groups);
    let result = coordinator.run(&args.request(), cancel).await;
    watcher.stop();

    match result {
        Ok(summary) => {
            report(&summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_cancelled() => {
            warn!("interrupted; completed iterations are kept");
            Ok(ExitCode::from(watcher.exit_code()))
        }
        Err(e) => Err(e.into()),
    }
}

fn report(summary: &RunSummary) {
    for name in &summary.skipped_refs {
        warn!("skipped ref {name}");
    }
    for version in &summary.skipped_versions {
        warn!("skipped chrome@{version}");
    }
    for cell in &summary.failed_cells {
        warn!("warmup failed for {cell}; cell skipped");
    }
    if summary.is_idle() {
        info!("nothing to run");
        return;
    }
    info!(
        "done: {}/{} iterations recorded, {} failed",
        summary.completed, summary.total, summary.failed
    );
}
