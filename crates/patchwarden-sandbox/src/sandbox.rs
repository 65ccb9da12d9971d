//! Ephemeral execution directory
//!
//! A sandbox is a temporary directory destroyed on drop. Projects are
//! mirrored into it without VCS metadata or build output, and commands run
//! inside it with a hard timeout.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, SandboxError};

/// Directories never mirrored into a sandbox
const MIRROR_SKIP: &[&str] = &[".git", "target", "node_modules"];

/// Isolated working directory
#[derive(Debug)]
pub struct Sandbox {
    pub id: Uuid,
    /// Held so the directory lives as long as the sandbox
    _temp_dir: TempDir,
    pub root_path: PathBuf,
}

/// Result of one command run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Seconds
    pub duration: f64,
}

impl Sandbox {
    /// Create an empty sandbox under the system temp directory
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("patchwarden-sandbox-")
            .tempdir()?;
        let sandbox = Self {
            id: Uuid::new_v4(),
            root_path: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        };
        tracing::debug!("Sandbox {} created at {}", sandbox.id, sandbox.root_path.display());
        Ok(sandbox)
    }


    /// Write files relative to the sandbox root
    pub fn prepare(&self, files: &[(PathBuf, String)]) -> Result<()> {
        for (path, content) in files {
            if path.is_absolute() || path.components().any(|c| c.as_os_str() == "..") {
                return Err(SandboxError::OutsideRoot(path.display().to_string()));
            }
            let full_path = self.root_path.join(path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full_path, content)?;
        }
        Ok(())
    }

    /// Copy a project into the sandbox, skipping VCS and build directories.
    /// Returns the number of files copied.
    pub fn mirror_project(&self, source_root: &Path) -> Result<usize> {
        let mut copied = 0;
        for entry in WalkDir::new(source_root).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !MIRROR_SKIP.contains(&name.as_ref())
        }) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative_path = entry
                .path()
                .strip_prefix(source_root)
                .map_err(|_| SandboxError::OutsideRoot(entry.path().display().to_string()))?;
            let dest_path = self.root_path.join(relative_path);

            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), dest_path)?;
            copied += 1;
        }
        tracing::debug!("Sandbox {} mirrored {} files", self.id, copied);
        Ok(copied)
    }

    /// Run a command inside the sandbox
    pub async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ExecutionResult> {
        run_in(&self.root_path, program, args, None, timeout).await
    }
}

/// Run `program` in `dir`, optionally feeding `stdin`, and kill it once
/// `timeout` elapses
pub async fn run_in(
    dir: &Path,
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SandboxError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await?;
        drop(pipe);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            tracing::warn!("'{}' exceeded {:?}; killed", program, timeout);
            return Err(SandboxError::Timeout {
                program: program.to_string(),
                seconds: timeout.as_secs(),
            });
        }
    };

    Ok(ExecutionResult {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        duration: started.elapsed().as_secs_f64(),
    })
}
