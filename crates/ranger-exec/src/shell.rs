use std::{process::Stdio, time::{Duration, Instant}};

use async_trait::async_trait;
use ranger_core::executor::{ExecOutcome, Executor, IterationOutput, IterationRequest, SPAWN_FAILURE_EXIT_CODE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    group::ProcessGroups,
    util::{elapsed_ms, exit_code, kill_graceful, kill_group, read_all, shell_command},
};

/// Default time a cancelled command gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Executor: runs the benchmark command in the shell (`sh -c` / `cmd /C`).
///
/// Never fails: spawn and wait errors come back as an exit code of 1 with the
/// error text in stderr.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    name: &'static str,
    grace: Duration,
    groups: ProcessGroups,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            name: "shell",
            grace: DEFAULT_KILL_GRACE,
            groups: ProcessGroups::default(),
        }
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Register spawned commands in `groups` while they run.
    pub fn with_groups(mut self, groups: ProcessGroups) -> Self {
        self.groups = groups;
        self
    }
}

fn failure(started: Instant, reason: String) -> ExecOutcome {
    ExecOutcome::Exited(IterationOutput {
        exit_code: SPAWN_FAILURE_EXIT_CODE,
        stdout: Vec::new(),
        stderr: reason.into_bytes(),
        duration_ms: elapsed_ms(started.elapsed()),
    })
}

#[async_trait]
impl Executor for ShellExecutor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, req: &IterationRequest, cancel: &CancellationToken) -> ExecOutcome {
        if cancel.is_cancelled() {
            return ExecOutcome::Cancelled;
        }

        let mut cmd = shell_command(&req.command);
        cmd.current_dir(&req.dir)
            .envs(req.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        trace!(target: "ranger.exec.shell", command = %req.command, version = %req.version, revision = %req.revision, iteration = req.iteration, "spawn");
        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(target: "ranger.exec.shell", error = %e, "spawn failed");
                return failure(started, format!("spawn: {e}"));
            }
        };

        let Some(pid) = child.id() else {
            return failure(started, "spawn: child exited before it was tracked".into());
        };
        let _tracked = self.groups.track(pid);
        let mut stdout = tokio::spawn(read_all(child.stdout.take()));
        let mut stderr = tokio::spawn(read_all(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                debug!(target: "ranger.exec.shell", "cancelled; killing child");
                let _ = kill_graceful(&mut child, self.grace).await;
                stdout.abort();
                stderr.abort();
                return ExecOutcome::Cancelled;
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return failure(started, format!("wait: {e}")),
        };

        // A background process left behind by the command can hold the pipes open.
        let drained = tokio::select! {
            out = async { ((&mut stdout).await, (&mut stderr).await) } => Some(out),
            _ = cancel.cancelled() => None,
        };
        let Some((stdout, stderr)) = drained else {
            debug!(target: "ranger.exec.shell", "cancelled while draining output; killing group");
            kill_group(pid);
            stdout.abort();
            stderr.abort();
            return ExecOutcome::Cancelled;
        };

        let code = exit_code(&status);
        if code != 0 {
            debug!(target: "ranger.exec.shell", code, "exit non-zero");
        }
        ExecOutcome::Exited(IterationOutput {
            exit_code: code,
            stdout: stdout.unwrap_or_default(),
            stderr: stderr.unwrap_or_default(),
            duration_ms: elapsed_ms(started.elapsed()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn request(command: &str, dir: PathBuf) -> IterationRequest {
        IterationRequest {
            command: command.into(),
            chrome_bin: PathBuf::from("/opt/chrome/chrome"),
            version: "120.0.6099.109".into(),
            revision: "feature/x".into(),
            sha: "0123456789abcdef".into(),
            dir,
            iteration: 7,
            extra_env: Vec::new(),
        }
    }

    fn exited(outcome: ExecOutcome) -> IterationOutput {
        match outcome {
            ExecOutcome::Exited(out) => out,
            ExecOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn captures_streams_separately() {
        let dir = tempfile::tempdir().unwrap();
        let out = exited(
            ShellExecutor::new()
                .execute(&request("printf out; printf err >&2; exit 3", dir.path().into()), &CancellationToken::new())
                .await,
        );
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, b"out");
        assert_eq!(out.stderr, b"err");
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn exposes_environment_contract() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = r#"printf '%s|%s|%s|%s|%s|%s' "$CHROME_BIN" "$CHROME_VERSION" "$CODE_REF" "$CODE_SHA" "$CODE_DIR" "$ITERATION""#;
        let out = exited(
            ShellExecutor::new()
                .execute(&request(cmd, dir.path().into()), &CancellationToken::new())
                .await,
        );
        let expected = format!(
            "/opt/chrome/chrome|120.0.6099.109|feature/x|0123456789abcdef|{}|7",
            dir.path().display()
        );
        assert_eq!(String::from_utf8(out.stdout).unwrap(), expected);
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn signal_maps_to_128_plus() {
        let dir = tempfile::tempdir().unwrap();
        let out = exited(
            ShellExecutor::new()
                .execute(&request("kill -TERM $$", dir.path().into()), &CancellationToken::new())
                .await,
        );
        assert_eq!(out.exit_code, 128 + 15);
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn cancellation_reaches_background_process_holding_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let groups = ProcessGroups::new();
        let started = Instant::now();
        let outcome = ShellExecutor::new()
            .with_groups(groups.clone())
            .execute(&request("sleep 30 & exit 0", dir.path().into()), &cancel)
            .await;
        assert_eq!(outcome, ExecOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(groups.is_empty());
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn running_command_is_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let groups = ProcessGroups::new();
        let exec = ShellExecutor::new().with_groups(groups.clone());
        let req = request("sleep 0.3", dir.path().into());
        let run = tokio::spawn(async move { exec.execute(&req, &CancellationToken::new()).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(exited(run.await.unwrap()).exit_code, 0);
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_a_failed_result() {
        let out = exited(
            ShellExecutor::new()
                .execute(&request("true", PathBuf::from("/definitely/not/here")), &CancellationToken::new())
                .await,
        );
        assert_eq!(out.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(!out.stderr.is_empty());
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn cancellation_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = ShellExecutor::new()
            .with_kill_grace(Duration::from_millis(200))
            .execute(&request("sleep 30", dir.path().into()), &cancel)
            .await;
        assert_eq!(outcome, ExecOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
