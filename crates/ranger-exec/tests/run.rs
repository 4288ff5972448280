#![cfg(target_family = "unix")]

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use ranger_core::{
    Coordinator, CoreError, ResultStore, RunMode, RunRequest, SlotFilter, StateDir,
    collab::{PrepareError, ResolveError, RevisionResolver},
    progress::NoProgress,
};
use ranger_exec::{CacheProvisioner, ShellExecutor, ShellSetupRunner};
use ranger_model::{ChromeConfig, CodeConfig, Config, OutputStream, RunRecord};
use tokio_util::sync::CancellationToken;

/// Plain directories standing in for git worktrees.
struct DirResolver {
    root: PathBuf,
    shas: HashMap<String, String>,
}

#[async_trait]
impl RevisionResolver for DirResolver {
    async fn resolve(&self, name: &str) -> Result<String, ResolveError> {
        self.shas
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }

    async fn prepare(&self, name: &str, _sha: &str) -> Result<PathBuf, PrepareError> {
        let dir = self.root.join(name.replace('/', "-"));
        std::fs::create_dir_all(&dir).map_err(|e| PrepareError {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(dir)
    }
}

struct Project {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    cache: PathBuf,
}

impl Project {
    fn new(versions: &[&str]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(&root).unwrap();

        let provisioner = CacheProvisioner::new(&cache).offline();
        for v in versions {
            let exe = provisioner.executable_path(v);
            std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
            std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        }
        Self { _tmp: tmp, root, cache }
    }

    fn config(&self, command: &str, versions: &[&str], refs: &[&str], iterations: u32) -> Config {
        Config {
            command: command.into(),
            setup: None,
            iterations,
            warmup: 0,
            workers: 1,
            chrome: ChromeConfig {
                versions: versions.iter().map(|s| s.to_string()).collect(),
                cache_dir: Some(self.cache.clone()),
            },
            code: CodeConfig {
                repo: self.root.clone(),
                refs: refs.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn coordinator(&self, config: Config) -> Coordinator {
        let resolver = DirResolver {
            root: self.root.join("worktrees"),
            shas: [("main", "1111111aaaa"), ("feature/x", "2222222bbbb"), ("broken", "3333333cccc")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        Coordinator::new(
            config,
            StateDir::for_project(&self.root),
            Arc::new(resolver),
            Arc::new(CacheProvisioner::new(&self.cache).offline()),
            Arc::new(ShellExecutor::new()),
        )
        .with_setup(Arc::new(ShellSetupRunner::new()))
        .with_progress(Arc::new(NoProgress))
    }

    fn store(&self) -> ResultStore {
        ResultStore::new(StateDir::for_project(&self.root))
    }

    fn records(&self) -> Vec<RunRecord> {
        self.store().load().unwrap()
    }
}

fn stdout_of(store: &ResultStore, record: &RunRecord) -> String {
    let bytes = store.read_output(&record.id, OutputStream::Stdout).unwrap().unwrap();
    String::from_utf8(bytes).unwrap()
}

#[tokio::test]
async fn records_carry_environment_and_outputs() {
    let p = Project::new(&["120.0.1"]);
    let cmd = r#"printf '%s %s %s %s' "$CHROME_VERSION" "$CODE_REF" "$CODE_SHA" "$ITERATION"; test -x "$CHROME_BIN" || test -f "$CHROME_BIN"; pwd >&2"#;
    let c = p.coordinator(p.config(cmd, &["120.0.1"], &["feature/x"], 2));

    let summary = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!((summary.completed, summary.failed), (2, 0));

    let store = p.store();
    let mut records = p.records();
    records.sort_by_key(|r| r.iteration);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.revision, "feature/x");
        assert_eq!(r.sha, "2222222bbbb");
        assert_eq!(stdout_of(&store, r), format!("120.0.1 feature/x 2222222bbbb {i}"));
        let stderr = store.read_output(&r.id, OutputStream::Stderr).unwrap().unwrap();
        assert!(String::from_utf8(stderr).unwrap().trim_end().ends_with("feature-x"));
    }
    assert!(!StateDir::for_project(&p.root).lock_path().exists());
}

#[tokio::test]
async fn missing_command_is_recorded_not_raised() {
    let p = Project::new(&["120.0.1"]);
    let c = p.coordinator(p.config("definitely-not-a-command-7f3a", &["120.0.1"], &["main"], 1));
    let summary = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!((summary.completed, summary.failed), (1, 1));
    assert_ne!(p.records()[0].exit_code, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_keep_the_log_well_formed() {
    let p = Project::new(&["120.0.1", "121.0.1"]);
    let mut config = p.config("printf x; exit $((ITERATION % 3 == 0))", &["120.0.1", "121.0.1"], &["main", "feature/x"], 6);
    config.workers = 4;
    let c = p.coordinator(config);

    let summary = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total, 24);
    assert_eq!(summary.completed, 24);
    assert_eq!(summary.failed, 8);

    let raw = std::fs::read_to_string(StateDir::for_project(&p.root).runs_path()).unwrap();
    assert_eq!(raw.lines().count(), 24);
    let ids: HashSet<_> = p.records().into_iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 24);

    // Only the failed slots are pending on resume.
    let again = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!(again.total, 8);
}

#[tokio::test]
async fn resume_after_success_is_idle() {
    let p = Project::new(&["120.0.1"]);
    let c = p.coordinator(p.config("true", &["120.0.1"], &["main"], 3));
    c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    let again = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert!(again.is_idle());
    assert_eq!(p.records().len(), 3);
}

#[tokio::test]
async fn warmup_failure_gates_only_its_cell() {
    let p = Project::new(&["120.0.1"]);
    let mut config = p.config(r#"test "$CODE_REF" != broken"#, &["120.0.1"], &["main", "broken"], 2);
    config.warmup = 2;
    let c = p.coordinator(config);

    let summary = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!(summary.failed_cells.len(), 1);
    assert_eq!(summary.failed_cells[0].revision, "broken");
    let records = p.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.revision == "main" && r.exit_code == 0));
}

#[tokio::test]
async fn setup_runs_once_and_failure_skips_ref() {
    let p = Project::new(&["120.0.1"]);
    let mut config = p.config("true", &["120.0.1"], &["main", "broken"], 1);
    config.setup = Some(r#"echo run >> setup.log; test "$(basename "$PWD")" != broken"#.into());
    let c = p.coordinator(config);

    let summary = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped_refs, vec!["broken".to_string()]);

    c.run(&RunRequest::new(RunMode::Append(1), SlotFilter::default()), CancellationToken::new())
        .await
        .unwrap();
    let log = std::fs::read_to_string(p.root.join("worktrees/main/setup.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert_eq!(p.records().len(), 2);
}

#[tokio::test]
async fn replace_rewrites_targeted_cells() {
    let p = Project::new(&["120.0.1", "121.0.1"]);
    let c = p.coordinator(p.config("printf v1", &["120.0.1", "121.0.1"], &["main"], 2));
    c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap();

    let c = p.coordinator(p.config("printf v2", &["120.0.1", "121.0.1"], &["main"], 2));
    let filter = SlotFilter::new(Some(vec!["121.0.1".into()]), None);
    c.run(&RunRequest::new(RunMode::Replace, filter), CancellationToken::new())
        .await
        .unwrap();

    let store = p.store();
    let records = p.records();
    assert_eq!(records.len(), 4);
    for r in &records {
        let expected = if r.version == "121.0.1" { "v2" } else { "v1" };
        assert_eq!(stdout_of(&store, r), expected);
    }
}

#[tokio::test]
async fn cancellation_stops_in_flight_commands() {
    let p = Project::new(&["120.0.1"]);
    let c = p.coordinator(p.config("sleep 30", &["120.0.1"], &["main"], 3));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = c.run(&RunRequest::default(), cancel).await.unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(p.records().is_empty());
    assert!(!StateDir::for_project(&p.root).lock_path().exists());
}

#[tokio::test]
async fn missing_binaries_abort_the_run() {
    let p = Project::new(&[]);
    let c = p.coordinator(p.config("true", &["120.0.1"], &["main"], 1));
    let err = c.run(&RunRequest::default(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::NoBinaries));
    assert!(!Path::new(&StateDir::for_project(&p.root).lock_path()).exists());
}
