use std::{path::Path, process::ExitCode};

use ranger_core::{ResultStore, collab::RevisionResolver, matrix};
use ranger_exec::GitResolver;
use tracing::warn;

use crate::project::Project;

pub async fn status(project: &Path) -> anyhow::Result<ExitCode> {
    let project = Project::load(project)?;
    let resolver = GitResolver::new(&project.config.code.repo, project.state.worktrees_dir());

    let mut revisions = Vec::with_capacity(project.config.code.refs.len());
    for name in &project.config.code.refs {
        match resolver.resolve(name).await {
            Ok(sha) => revisions.push((name.clone(), sha)),
            Err(e) => warn!("{e}"),
        }
    }

    let history = ResultStore::new(project.state.clone()).load()?;
    let cells = matrix::cell_status(
        &project.config.chrome.versions,
        &revisions,
        &history,
        project.config.iterations,
    );

    let width = cells.iter().map(|c| c.cell.to_string().len() + 10).max().unwrap_or(0);
    for status in cells {
        let label = format!("{} ({})", status.cell, status.sha.get(..7).unwrap_or(&status.sha));
        let mark = if status.is_complete() { "✓" } else { " " };
        let failed = if status.failed > 0 {
            format!("  {} failed", status.failed)
        } else {
            String::new()
        };
        println!("{label:<width$}  {}/{} {mark}{failed}", status.succeeded, status.target);
    }
    Ok(ExitCode::SUCCESS)
}
