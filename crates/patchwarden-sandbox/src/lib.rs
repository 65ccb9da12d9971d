//! Patchwarden Sandbox - process-backed repository collaborator
//!
//! Clones repositories with `git`, applies patches with `git apply` and runs
//! test commands inside an ephemeral mirror of the checkout, each under a
//! hard timeout so a hung process can never stall the pipeline.

#![deny(unsafe_code)]

pub mod error;
pub mod git;
pub mod sandbox;

pub use error::{Result, SandboxError};
pub use git::GitRepositoryClient;
pub use sandbox::{ExecutionResult, Sandbox};
