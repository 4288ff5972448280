//! Git-backed revision resolution and per-revision worktrees.
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use ranger_core::collab::{PrepareError, ResolveError, RevisionResolver};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use crate::error::{ExecError, ExecResult};

/// Directory name for revision `name`: slashes become dashes, and a clash
/// with `existing` gets the first free `-2`, `-3`, ... suffix.
pub fn safe_worktree_name(name: &str, existing: &[String]) -> String {
    let base = name.replace('/', "-");
    if !existing.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or(base)
}

async fn git(dir: &Path, args: &[&str]) -> ExecResult<String> {
    trace!(target: "ranger.exec.git", dir = %dir.display(), ?args, "git");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ExecError::Spawn(format!("git: {e}")))?;

    if !output.status.success() {
        return Err(ExecError::Command {
            command: format!("git {}", args.join(" ")),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Resolves refs in `repo` and checks them out as detached worktrees under
/// `worktrees`.
#[derive(Debug, Clone)]
pub struct GitResolver {
    repo: PathBuf,
    worktrees: PathBuf,
}

impl GitResolver {
    pub fn new(repo: impl Into<PathBuf>, worktrees: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            worktrees: worktrees.into(),
        }
    }

    #[inline]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    #[inline]
    pub fn worktrees(&self) -> &Path {
        &self.worktrees
    }

    /// Whether `path` is the top level of its own checkout.
    ///
    /// A stray directory under the worktrees root would otherwise resolve to
    /// the enclosing project repository.
    async fn is_worktree_root(path: &Path) -> bool {
        if tokio::fs::symlink_metadata(path.join(".git")).await.is_err() {
            return false;
        }
        let Ok(top) = git(path, &["rev-parse", "--show-toplevel"]).await else {
            return false;
        };
        match (tokio::fs::canonicalize(&top).await, tokio::fs::canonicalize(path).await) {
            (Ok(top), Ok(path)) => top == path,
            _ => false,
        }
    }

    /// Reuse `path` if it is a live worktree, moving it to `sha`.
    ///
    /// Returns `false` when `path` had to be discarded.
    async fn reuse(&self, path: &Path, sha: &str) -> bool {
        if Self::is_worktree_root(path).await {
            match git(path, &["checkout", "--detach", "--quiet", sha]).await {
                Ok(_) => return true,
                Err(e) => {
                    debug!(target: "ranger.exec.git", path = %path.display(), error = %e, "checkout failed");
                }
            }
        }

        debug!(target: "ranger.exec.git", path = %path.display(), "discarding worktree");
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!(target: "ranger.exec.git", path = %path.display(), error = %e, "failed to remove worktree");
        }
        let _ = git(&self.repo, &["worktree", "prune"]).await;
        false
    }

    async fn existing_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&self.worktrees).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names
    }

    /// Remove every worktree under the worktrees directory, then the
    /// directory itself. Returns how many entries were removed.
    pub async fn clean(&self) -> ExecResult<usize> {
        let names = match tokio::fs::metadata(&self.worktrees).await {
            Ok(_) => self.existing_names().await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        for name in &names {
            let path = self.worktrees.join(name);
            let path_str = path.to_string_lossy();
            if let Err(e) = git(&self.repo, &["worktree", "remove", "--force", &path_str]).await {
                debug!(target: "ranger.exec.git", path = %path.display(), error = %e, "worktree remove failed; deleting directory");
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if let Err(e) = git(&self.repo, &["worktree", "prune"]).await {
            debug!(target: "ranger.exec.git", error = %e, "worktree prune failed");
        }
        match tokio::fs::remove_dir_all(&self.worktrees).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(target: "ranger.exec.git", removed = names.len(), "worktrees cleaned");
        Ok(names.len())
    }
}

#[async_trait]
impl RevisionResolver for GitResolver {
    async fn resolve(&self, name: &str) -> Result<String, ResolveError> {
        let revspec = format!("{name}^{{commit}}");
        git(&self.repo, &["rev-parse", "--verify", "--quiet", &revspec])
            .await
            .ok()
            .filter(|sha| !sha.is_empty())
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }

    async fn prepare(&self, name: &str, sha: &str) -> Result<PathBuf, PrepareError> {
        let fail = |reason: String| PrepareError {
            name: name.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.worktrees)
            .await
            .map_err(|e| fail(e.to_string()))?;

        let base = self.worktrees.join(name.replace('/', "-"));
        if tokio::fs::metadata(&base).await.is_ok_and(|m| m.is_dir()) && self.reuse(&base, sha).await {
            return Ok(base);
        }

        let dir_name = safe_worktree_name(name, &self.existing_names().await);
        let path = self.worktrees.join(dir_name);
        let path_str = path.to_string_lossy();
        git(&self.repo, &["worktree", "add", "--detach", &path_str, sha])
            .await
            .map_err(|e| fail(e.to_string()))?;
        debug!(target: "ranger.exec.git", %name, path = %path.display(), "worktree created");
        Ok(path)
    }
}
