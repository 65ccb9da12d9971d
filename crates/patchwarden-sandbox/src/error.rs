//! Sandbox errors

use patchwarden_core::RepositoryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path {0} is outside the project root")]
    OutsideRoot(String),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("background task failed: {0}")]
    Join(String),
}

impl SandboxError {
    /// Map into the repository collaborator's error space
    pub fn into_repository_error(self, during_clone: bool) -> RepositoryError {
        match self {
            SandboxError::Timeout { seconds, .. } => RepositoryError::Timeout(seconds),
            SandboxError::Spawn { .. } => RepositoryError::CommandFailed(self.to_string()),
            other if during_clone => RepositoryError::CloneFailed(other.to_string()),
            other => RepositoryError::CommandFailed(other.to_string()),
        }
    }
}
