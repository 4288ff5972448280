use std::{
    path::Path,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use ranger_core::{
    collab::{SetupOutcome, SetupRunner},
    executor::SPAWN_FAILURE_EXIT_CODE,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    group::ProcessGroups,
    shell::DEFAULT_KILL_GRACE,
    util::{elapsed_ms, exit_code, kill_graceful, shell_command},
};

/// Marker left in a working directory after a successful setup.
pub const SETUP_MARKER: &str = ".chrome-ranger-setup-done";

/// Runs the configured setup command once per `(dir, sha)`.
///
/// The marker file holds the sha the setup last succeeded at; a matching
/// marker skips the command entirely.
#[derive(Debug, Clone)]
pub struct ShellSetupRunner {
    grace: Duration,
    groups: ProcessGroups,
}

impl Default for ShellSetupRunner {
    fn default() -> Self {
        Self {
            grace: DEFAULT_KILL_GRACE,
            groups: ProcessGroups::default(),
        }
    }
}

impl ShellSetupRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_groups(mut self, groups: ProcessGroups) -> Self {
        self.groups = groups;
        self
    }
}

async fn marker_matches(dir: &Path, sha: &str) -> bool {
    match tokio::fs::read_to_string(dir.join(SETUP_MARKER)).await {
        Ok(content) => content.trim() == sha,
        Err(_) => false,
    }
}

#[async_trait]
impl SetupRunner for ShellSetupRunner {
    async fn run_once(&self, command: &str, dir: &Path, sha: &str, cancel: &CancellationToken) -> SetupOutcome {
        if marker_matches(dir, sha).await {
            return SetupOutcome::Cached;
        }
        if cancel.is_cancelled() {
            return SetupOutcome::Cancelled;
        }

        let mut cmd = shell_command(command);
        cmd.current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!(target: "ranger.exec.setup", %command, dir = %dir.display(), "running setup");
        let started = Instant::now();
        let spawn_failed = |e: std::io::Error| {
            warn!(target: "ranger.exec.setup", error = %e, "setup spawn failed");
            SetupOutcome::Failed {
                exit_code: SPAWN_FAILURE_EXIT_CODE,
            }
        };
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return spawn_failed(e),
        };
        let _tracked = child.id().map(|pid| self.groups.track(pid));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                debug!(target: "ranger.exec.setup", "cancelled; killing setup");
                let _ = kill_graceful(&mut child, self.grace).await;
                return SetupOutcome::Cancelled;
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return spawn_failed(e),
        };

        let code = exit_code(&status);
        if code != 0 {
            return SetupOutcome::Failed { exit_code: code };
        }
        if let Err(e) = tokio::fs::write(dir.join(SETUP_MARKER), sha).await {
            warn!(target: "ranger.exec.setup", error = %e, "failed to write setup marker");
        }
        SetupOutcome::Succeeded {
            duration_ms: elapsed_ms(started.elapsed()),
        }
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use super::*;

    fn none() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn runs_once_per_sha() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellSetupRunner::new();
        let cmd = "echo x >> count";

        assert!(matches!(runner.run_once(cmd, dir.path(), "aaa", &none()).await, SetupOutcome::Succeeded { .. }));
        assert_eq!(runner.run_once(cmd, dir.path(), "aaa", &none()).await, SetupOutcome::Cached);
        assert!(matches!(runner.run_once(cmd, dir.path(), "bbb", &none()).await, SetupOutcome::Succeeded { .. }));

        let count = std::fs::read_to_string(dir.path().join("count")).unwrap();
        assert_eq!(count.lines().count(), 2);
        assert_eq!(std::fs::read_to_string(dir.path().join(SETUP_MARKER)).unwrap(), "bbb");
    }

    #[tokio::test]
    async fn failure_leaves_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ShellSetupRunner::new().run_once("exit 4", dir.path(), "aaa", &none()).await;
        assert_eq!(outcome, SetupOutcome::Failed { exit_code: 4 });
        assert!(!dir.path().join(SETUP_MARKER).exists());
    }

    #[tokio::test]
    async fn cancellation_stops_long_setup() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let groups = ProcessGroups::new();
        let started = Instant::now();
        let outcome = ShellSetupRunner::new()
            .with_kill_grace(Duration::from_millis(200))
            .with_groups(groups.clone())
            .run_once("sleep 30", dir.path(), "aaa", &cancel)
            .await;
        assert_eq!(outcome, SetupOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!dir.path().join(SETUP_MARKER).exists());
        assert!(groups.is_empty());
    }
}
