use std::{path::Path, process::ExitCode};

use anyhow::{Context, bail};
use ranger_core::config::config_path;
use tracing::info;

const TEMPLATE: &str = r#"# Command run once per iteration. It receives CHROME_BIN, CHROME_VERSION,
# CODE_REF, CODE_SHA, CODE_DIR and ITERATION in its environment.
command: npx playwright test

# Optional, runs once per checkout and sha.
setup: npm ci

iterations: 5
warmup: 1
workers: 2

chrome:
  versions:
    - "REPLACE_WITH_VERSION"

code:
  repo: .
  refs:
    - main
"#;

pub fn init(project: &Path, force: bool) -> anyhow::Result<ExitCode> {
    let path = config_path(project);
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite.", path.display());
    }
    std::fs::write(&path, TEMPLATE).with_context(|| format!("failed to write {}", path.display()))?;
    info!("created {}", path.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let written = std::fs::read_to_string(config_path(dir.path())).unwrap();
        assert_eq!(written, TEMPLATE);

        std::fs::write(config_path(dir.path()), "custom").unwrap();
        assert!(init(dir.path(), false).is_err());
        assert_eq!(std::fs::read_to_string(config_path(dir.path())).unwrap(), "custom");

        init(dir.path(), true).unwrap();
        assert_eq!(std::fs::read_to_string(config_path(dir.path())).unwrap(), TEMPLATE);
    }

    #[test]
    fn template_parses() {
        let cfg = ranger_core::config::parse(TEMPLATE).unwrap();
        assert_eq!(cfg.chrome.versions, vec!["REPLACE_WITH_VERSION".to_string()]);
        assert_eq!(cfg.setup.as_deref(), Some("npm ci"));
        assert_eq!((cfg.iterations, cfg.warmup, cfg.workers), (5, 1, 2));
    }
}
