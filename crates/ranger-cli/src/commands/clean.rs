use std::{path::Path, process::ExitCode};

use ranger_core::{StateDir, lock};
use ranger_exec::GitResolver;
use tracing::info;

use crate::project::Project;

/// Remove every worktree. Falls back to the project directory as the repo
/// when no configuration can be loaded.
pub async fn clean(project: &Path) -> anyhow::Result<ExitCode> {
    let (repo, state) = match Project::load(project) {
        Ok(p) => (p.config.code.repo, p.state),
        Err(_) => (project.to_path_buf(), StateDir::for_project(project)),
    };

    let guard = lock::acquire(&state.lock_path())?;
    let removed = GitResolver::new(repo, state.worktrees_dir()).clean().await?;
    guard.release()?;

    info!("removed {removed} worktree(s)");
    Ok(ExitCode::SUCCESS)
}
