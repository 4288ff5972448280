use std::path::{Path, PathBuf};

use anyhow::Context;
use ranger_core::{StateDir, config};
use ranger_model::Config;

/// Loaded configuration with paths resolved against the project directory.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub state: StateDir,
}

impl Project {
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let root = std::path::absolute(root)
            .with_context(|| format!("invalid project directory {}", root.display()))?;
        let mut config = config::load(&config::config_path(&root))?;

        config.code.repo = anchor(&root, &config.code.repo);
        if let Some(dir) = config.chrome.cache_dir.take() {
            config.chrome.cache_dir = Some(anchor(&root, &expand_home(&dir)));
        }

        Ok(Self {
            state: StateDir::for_project(&root),
            root,
            config,
        })
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        config::cache_dir(&self.config)
    }
}

fn anchor(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_paths_against_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(config::CONFIG_FILE),
            "command: bench\niterations: 2\nchrome:\n  versions: [\"120\"]\n  cache_dir: cache\ncode:\n  repo: ./app\n  refs: [main]\n",
        )
        .unwrap();

        let project = Project::load(dir.path()).unwrap();
        assert_eq!(project.config.code.repo, dir.path().join("./app"));
        assert_eq!(project.cache_dir(), dir.path().join("cache"));
        assert_eq!(project.state.root(), dir.path().join(".chrome-ranger"));
    }

    #[test]
    fn missing_config_mentions_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("chrome-ranger init"));
    }
}
