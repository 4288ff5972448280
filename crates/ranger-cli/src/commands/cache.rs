use std::{path::Path, process::ExitCode};

use ranger_core::config;
use ranger_exec::CacheProvisioner;
use tracing::info;

use crate::project::Project;

/// Remove every cached Chrome binary. Uses the default cache location when
/// no configuration can be loaded.
pub async fn cache_clean(project: &Path) -> anyhow::Result<ExitCode> {
    let dir = match Project::load(project) {
        Ok(p) => p.cache_dir(),
        Err(_) => config::default_cache_dir(),
    };
    if CacheProvisioner::new(&dir).clean().await? {
        info!("removed cached chrome binaries from {}", dir.display());
    } else {
        info!("no chrome cache at {}", dir.display());
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_configured_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(config::CONFIG_FILE),
            "command: bench\niterations: 1\nchrome:\n  versions: [\"120\"]\n  cache_dir: cache\ncode:\n  repo: .\n  refs: [main]\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("cache/chrome/linux64-120")).unwrap();

        cache_clean(dir.path()).await.unwrap();
        assert!(!dir.path().join("cache").exists());
    }
}
