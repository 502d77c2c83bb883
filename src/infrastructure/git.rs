//! Git operations
//!
//! Lists the files a branch changed and resolves the SHA a run is about.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::error::GitError;

/// Client for git operations
pub struct GitClient {
    /// Working directory for git commands
    working_dir: Option<PathBuf>,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    /// Create a new git client for current directory
    pub fn new() -> Self {
        Self { working_dir: None }
    }

    /// Create a git client for a specific directory
    pub fn in_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(path.into()),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Get git SHA for run metadata
    ///
    /// Priority:
    /// 1. GIT_SHA env var (set by CI)
    /// 2. GITHUB_SHA env var
    /// 3. git rev-parse --short HEAD
    pub async fn get_sha(&self) -> Result<String, GitError> {
        for var in ["GIT_SHA", "GITHUB_SHA"] {
            if let Ok(sha) = std::env::var(var) {
                if !sha.is_empty() {
                    return Ok(sha);
                }
            }
        }

        let output = self
            .command(&["rev-parse", "--short", "HEAD"])
            .output()
            .await
            .map_err(|_| GitError::NotARepository)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::ShaFailed(stderr.trim().to_string()));
        }

        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            return Err(GitError::ShaFailed("Empty SHA returned".to_string()));
        }

        Ok(sha)
    }

    /// Files added, modified or renamed under `dir` between the merge base
    /// of `base` and HEAD, relative to the working directory.
    pub async fn changed_files(&self, base: &str, dir: &Path) -> Result<Vec<PathBuf>, GitError> {
        let range = format!("{}...HEAD", base);
        let dir = dir.to_string_lossy();
        let args = [
            "diff",
            "--name-only",
            "--relative",
            "--diff-filter=AMR",
            range.as_str(),
            "--",
            dir.as_ref(),
        ];
        debug!("Running git {}", args.join(" "));

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|_| GitError::NotARepository)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("unknown revision") || stderr.contains("bad revision") {
                return Err(GitError::UnknownRef {
                    reference: base.to_string(),
                });
            }
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepository);
            }
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                message: stderr,
            });
        }

        Ok(parse_name_only(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One path per non-empty line of `git diff --name-only`
fn parse_name_only(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}
