//! `git`-backed repository collaborator

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use patchwarden_core::pipeline::{CloneInfo, CommandOutput, RepositoryClient};
use patchwarden_core::RepositoryError;

use crate::error::SandboxError;
use crate::sandbox::{run_in, ExecutionResult, Sandbox};

/// Clones with the `git` binary and runs commands through `tokio::process`.
///
/// With `isolate_commands` set, commands run in a fresh [`Sandbox`] mirror
/// of the checkout instead of the checkout itself.
#[derive(Debug, Clone)]
pub struct GitRepositoryClient {
    /// Limit for short git housekeeping calls
    git_timeout: Duration,
    isolate_commands: bool,
}

impl Default for GitRepositoryClient {
    fn default() -> Self {
        Self {
            git_timeout: Duration::from_secs(60),
            isolate_commands: true,
        }
    }
}

impl GitRepositoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit for git calls other than clone, which takes the caller's limit
    pub fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    pub fn with_isolation(mut self, isolate: bool) -> Self {
        self.isolate_commands = isolate;
        self
    }

    async fn git(&self, dir: &Path, args: &[&str], stdin: Option<&[u8]>) -> Result<ExecutionResult, SandboxError> {
        self.git_with_timeout(dir, args, stdin, self.git_timeout).await
    }

    async fn git_with_timeout(
        &self,
        dir: &Path,
        args: &[&str],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run_in(dir, "git", &args, stdin, timeout).await
    }

    async fn rev_parse(&self, dir: &Path, args: &[&str]) -> Option<String> {
        let args: Vec<&str> = std::iter::once("rev-parse").chain(args.iter().copied()).collect();
        match self.git(dir, &args, None).await {
            Ok(out) if out.success => Some(out.stdout.trim().to_string()),
            _ => None,
        }
    }
}

fn to_output(result: ExecutionResult) -> CommandOutput {
    CommandOutput {
        success: result.success,
        exit_code: result.exit_code,
        stdout: result.stdout,
        stderr: result.stderr,
        duration: result.duration,
    }
}

#[async_trait]
impl RepositoryClient for GitRepositoryClient {
    async fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<CloneInfo, RepositoryError> {
        if dest.exists() {
            return Err(RepositoryError::CloneFailed(format!(
                "destination {} already exists",
                dest.display()
            )));
        }
        let parent = dest
            .parent()
            .ok_or_else(|| RepositoryError::CloneFailed("destination has no parent".into()))?;
        std::fs::create_dir_all(parent).map_err(|e| RepositoryError::CloneFailed(e.to_string()))?;

        tracing::info!("Cloning {} into {}", url, dest.display());
        let dest_arg = dest.to_string_lossy().to_string();
        let result = self
            .git_with_timeout(
                parent,
                &["clone", "--depth", "1", "--quiet", "--", url, &dest_arg],
                None,
                timeout,
            )
            .await
            .map_err(|e| e.into_repository_error(true))?;
        if !result.success {
            return Err(RepositoryError::CloneFailed(result.stderr.trim().to_string()));
        }

        Ok(CloneInfo {
            url: url.to_string(),
            path: dest.to_path_buf(),
            head: self.rev_parse(dest, &["HEAD"]).await,
            branch: self.rev_parse(dest, &["--abbrev-ref", "HEAD"]).await,
        })
    }

    async fn apply_patch(&self, repo: &Path, diff: &str) -> Result<(), RepositoryError> {
        let check = self
            .git(repo, &["apply", "--check", "-"], Some(diff.as_bytes()))
            .await
            .map_err(|e| e.into_repository_error(false))?;
        if !check.success {
            return Err(RepositoryError::ApplyFailed(check.stderr.trim().to_string()));
        }

        let applied = self
            .git(repo, &["apply", "--whitespace=nowarn", "-"], Some(diff.as_bytes()))
            .await
            .map_err(|e| e.into_repository_error(false))?;
        if !applied.success {
            return Err(RepositoryError::ApplyFailed(applied.stderr.trim().to_string()));
        }
        tracing::info!("Patch applied in {}", repo.display());
        Ok(())
    }

    async fn run_command(
        &self,
        repo: &Path,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RepositoryError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RepositoryError::CommandFailed("empty command".into()))?;

        if !self.isolate_commands {
            return run_in(repo, program, args, None, timeout)
                .await
                .map(to_output)
                .map_err(|e| e.into_repository_error(false));
        }

        let source = repo.to_path_buf();
        let sandbox = tokio::task::spawn_blocking(move || -> Result<Sandbox, SandboxError> {
            let sandbox = Sandbox::new()?;
            sandbox.mirror_project(&source)?;
            Ok(sandbox)
        })
        .await
        .map_err(|e| RepositoryError::CommandFailed(SandboxError::Join(e.to_string()).to_string()))?
        .map_err(|e| e.into_repository_error(false))?;

        sandbox
            .run(program, args, timeout)
            .await
            .map(to_output)
            .map_err(|e| e.into_repository_error(false))
    }
}
