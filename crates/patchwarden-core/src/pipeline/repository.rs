//! Repository collaborator interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RepositoryError;

/// Metadata about a fresh checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneInfo {
    pub url: String,
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
}

/// Captured output of a command run inside a checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Seconds
    pub duration: f64,
}

impl CommandOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Black-box access to source repositories. Implementations must not
/// panic; every failure is a [`RepositoryError`].
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet, giving up after
    /// `timeout`
    async fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<CloneInfo, RepositoryError>;

    /// Apply a unified diff to the checkout at `repo`
    async fn apply_patch(&self, repo: &Path, diff: &str) -> Result<(), RepositoryError>;

    /// Run `argv` inside `repo`, killing it after `timeout`
    async fn run_command(
        &self,
        repo: &Path,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RepositoryError>;
}
