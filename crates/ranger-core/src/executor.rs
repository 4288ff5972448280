//! Iteration executor seam.
//!
//! Implementations run exactly one attempt of the user command and never
//! fail: spawn errors, non-zero exits and signals all come back as an
//! [`ExecOutcome::Exited`] with a non-zero exit code.
use std::path::PathBuf;

use async_trait::async_trait;
use ranger_model::Iteration;
use tokio_util::sync::CancellationToken;

pub const ENV_CHROME_BIN: &str = "CHROME_BIN";
pub const ENV_CHROME_VERSION: &str = "CHROME_VERSION";
pub const ENV_CODE_REF: &str = "CODE_REF";
pub const ENV_CODE_SHA: &str = "CODE_SHA";
pub const ENV_CODE_DIR: &str = "CODE_DIR";
pub const ENV_ITERATION: &str = "ITERATION";

/// Exit code reported when the command could not be spawned or awaited.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

/// Conventional exit code of a process terminated by `signal`.
#[inline]
pub fn signal_exit_code(signal: i32) -> i32 {
    128 + signal
}

/// Everything needed to run one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRequest {
    pub command: String,
    pub chrome_bin: PathBuf,
    pub version: String,
    pub revision: String,
    pub sha: String,
    /// Working directory of the revision; also exported as `CODE_DIR`.
    pub dir: PathBuf,
    pub iteration: Iteration,
    /// Additional variables; the fixed contract variables take precedence.
    pub extra_env: Vec<(String, String)>,
}

impl IterationRequest {
    /// Variables merged over the inherited environment, in application order.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = self.extra_env.clone();
        env.extend([
            (ENV_CHROME_BIN.to_string(), self.chrome_bin.display().to_string()),
            (ENV_CHROME_VERSION.to_string(), self.version.clone()),
            (ENV_CODE_REF.to_string(), self.revision.clone()),
            (ENV_CODE_SHA.to_string(), self.sha.clone()),
            (ENV_CODE_DIR.to_string(), self.dir.display().to_string()),
            (ENV_ITERATION.to_string(), self.iteration.to_string()),
        ]);
        env
    }
}

/// Captured result of a finished attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u64,
}

impl IterationOutput {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What an executor hands back; there is no error variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The attempt ran to completion (successfully or not).
    Exited(IterationOutput),
    /// Cancellation arrived first; the child was terminated and nothing is recorded.
    Cancelled,
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one attempt, terminating the child if `cancel` fires.
    async fn execute(&self, req: &IterationRequest, cancel: &CancellationToken) -> ExecOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_contract() {
        let req = IterationRequest {
            command: "true".into(),
            chrome_bin: PathBuf::from("/cache/chrome"),
            version: "120.0.1".into(),
            revision: "main".into(),
            sha: "abc".into(),
            dir: PathBuf::from("/wt/main"),
            iteration: 4,
            extra_env: vec![("ITERATION".into(), "bogus".into()), ("FOO".into(), "bar".into())],
        };
        let env = req.env();
        let last = |key: &str| {
            env.iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(last(ENV_CHROME_BIN), Some("/cache/chrome"));
        assert_eq!(last(ENV_CHROME_VERSION), Some("120.0.1"));
        assert_eq!(last(ENV_CODE_REF), Some("main"));
        assert_eq!(last(ENV_CODE_SHA), Some("abc"));
        assert_eq!(last(ENV_CODE_DIR), Some("/wt/main"));
        assert_eq!(last(ENV_ITERATION), Some("4"));
        assert_eq!(last("FOO"), Some("bar"));
    }

    #[test]
    fn signal_codes() {
        assert_eq!(signal_exit_code(9), 137);
        assert_eq!(signal_exit_code(15), 143);
    }
}
