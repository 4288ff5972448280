//! Loading and validation of `chrome-ranger.yaml`.
use std::path::{Path, PathBuf};

use ranger_model::{ChromeConfig, CodeConfig, Config};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "chrome-ranger.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}. Run \"chrome-ranger init\" to create one")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("invalid YAML in {path}: {reason}")]
    InvalidYaml { path: PathBuf, reason: String },
    #[error("config must be a YAML object")]
    NotAnObject,
    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    command: Option<String>,
    setup: Option<String>,
    iterations: Option<i64>,
    warmup: Option<i64>,
    workers: Option<i64>,
    chrome: Option<RawChrome>,
    code: Option<RawCode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawChrome {
    versions: Vec<Value>,
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCode {
    repo: Option<String>,
    refs: Vec<Value>,
}

/// Path of the configuration file for the project rooted at `project`.
#[inline]
pub fn config_path(project: &Path) -> PathBuf {
    project.join(CONFIG_FILE)
}

/// Read, parse and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    parse(&content).map_err(|e| match e {
        ConfigError::InvalidYaml { reason, .. } => ConfigError::InvalidYaml {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Parse and validate configuration text.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    if !value.is_mapping() {
        return Err(ConfigError::NotAnObject);
    }
    let raw: RawConfig = serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidYaml {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    validate(raw)
}

fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
    let command = raw
        .command
        .filter(|c| !c.is_empty())
        .ok_or(ConfigError::Invalid("\"command\" is required"))?;

    let iterations = raw
        .iterations
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(ConfigError::Invalid("\"iterations\" must be a positive integer"))?;

    let warmup = match raw.warmup {
        None => 0,
        Some(n) => u32::try_from(n)
            .map_err(|_| ConfigError::Invalid("\"warmup\" must be a non-negative integer"))?,
    };

    let workers = match raw.workers {
        None => 1,
        Some(n) if n > 0 => usize::try_from(n)
            .map_err(|_| ConfigError::Invalid("\"workers\" must be a positive integer"))?,
        Some(_) => return Err(ConfigError::Invalid("\"workers\" must be a positive integer")),
    };

    let chrome = raw
        .chrome
        .ok_or(ConfigError::Invalid("\"chrome\" section is required"))?;
    let versions = stringify(&chrome.versions);
    if versions.is_empty() {
        return Err(ConfigError::Invalid(
            "\"chrome.versions\" must be a non-empty array of version strings",
        ));
    }

    let code = raw
        .code
        .ok_or(ConfigError::Invalid("\"code\" section is required"))?;
    let repo = code
        .repo
        .filter(|r| !r.is_empty())
        .ok_or(ConfigError::Invalid("\"code.repo\" is required"))?;
    let refs = stringify(&code.refs);
    if refs.is_empty() {
        return Err(ConfigError::Invalid(
            "\"code.refs\" must be a non-empty array of ref strings",
        ));
    }

    Ok(Config {
        command,
        setup: raw.setup,
        iterations,
        warmup,
        workers,
        chrome: ChromeConfig {
            versions,
            cache_dir: chrome.cache_dir,
        },
        code: CodeConfig {
            repo: PathBuf::from(repo),
            refs,
        },
    })
}

fn stringify(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

/// Directory holding provisioned browser binaries.
///
/// `chrome.cache_dir` wins, then `$XDG_CACHE_HOME/chrome-ranger`, then
/// `$HOME/.cache/chrome-ranger`.
pub fn cache_dir(config: &Config) -> PathBuf {
    match &config.chrome.cache_dir {
        Some(dir) => dir.clone(),
        None => default_cache_dir(),
    }
}

/// Cache directory when no configuration names one.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME")
        && !xdg.is_empty()
    {
        return PathBuf::from(xdg).join("chrome-ranger");
    }
    PathBuf::from(std::env::var("HOME").unwrap_or_default())
        .join(".cache")
        .join("chrome-ranger")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
command: npx playwright test
setup: npm ci
iterations: 5
warmup: 1
workers: 2
chrome:
  versions: ["120.0.6099.109", 121]
code:
  repo: ./app
  refs: [main, v4.5.0]
"#;

    #[test]
    fn parses_valid_config() {
        let cfg = parse(VALID).unwrap();
        assert_eq!(cfg.command, "npx playwright test");
        assert_eq!(cfg.setup.as_deref(), Some("npm ci"));
        assert_eq!(cfg.iterations, 5);
        assert_eq!(cfg.warmup, 1);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.chrome.versions, vec!["120.0.6099.109", "121"]);
        assert_eq!(cfg.code.repo, PathBuf::from("./app"));
        assert_eq!(cfg.code.refs, vec!["main", "v4.5.0"]);
    }

    #[test]
    fn defaults_for_optional_fields() {
        let cfg = parse(
            "command: x\niterations: 1\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: [main]\n",
        )
        .unwrap();
        assert_eq!(cfg.warmup, 0);
        assert_eq!(cfg.workers, 1);
        assert!(cfg.setup.is_none());
        assert!(cfg.chrome.cache_dir.is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ("iterations: 1\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: [m]\n", "command"),
            ("command: x\niterations: 0\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: [m]\n", "iterations"),
            ("command: x\niterations: 1\nwarmup: -1\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: [m]\n", "warmup"),
            ("command: x\niterations: 1\nworkers: 0\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: [m]\n", "workers"),
            ("command: x\niterations: 1\nchrome:\n  versions: []\ncode:\n  repo: .\n  refs: [m]\n", "chrome.versions"),
            ("command: x\niterations: 1\nchrome:\n  versions: ['1']\ncode:\n  refs: [m]\n", "code.repo"),
            ("command: x\niterations: 1\nchrome:\n  versions: ['1']\ncode:\n  repo: .\n  refs: []\n", "code.refs"),
            ("command: x\niterations: 1\ncode:\n  repo: .\n  refs: [m]\n", "chrome"),
        ];
        for (yaml, field) in cases {
            let err = parse(yaml).unwrap_err().to_string();
            assert!(err.contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn rejects_non_mapping_and_bad_yaml() {
        assert!(matches!(parse("- a\n- b\n"), Err(ConfigError::NotAnObject)));
        assert!(matches!(
            parse("command: [unterminated"),
            Err(ConfigError::InvalidYaml { .. })
        ));
    }

    #[test]
    fn missing_file_points_to_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&config_path(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("chrome-ranger init"));
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let mut cfg = parse(VALID).unwrap();
        cfg.chrome.cache_dir = Some(PathBuf::from("/tmp/cache"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/cache"));
    }
}
