//! Patchwarden Core - guarded orchestration for automated code remediation
//!
//! Patchwarden turns repository events into analysis tasks for a pool of
//! specialised agents and, for issues that opt in, into draft fixes backed
//! by test evidence. Nothing mutating happens without passing a guardrail.
//!
//! # Architecture
//!
//! 1. **Security** (`security`): webhook signature verification and the
//!    guardrails every file, command, patch and repository access passes
//! 2. **Scheduler** (`scheduler`): task lifecycle, agent routing and
//!    concurrent fan-out with result merging
//! 3. **Pipeline** (`pipeline`): clone, analyze, patch, test and propose,
//!    each stage gated on the previous one
//!
//! # Quick Start
//!
//! ```
//! use patchwarden_core::config::GuardrailConfig;
//! use patchwarden_core::security::{RepositoryOperation, SecurityGuardrails};
//!
//! let guardrails = SecurityGuardrails::new(GuardrailConfig::default());
//!
//! let decision = guardrails.validate_command("cargo test");
//! assert!(decision.valid);
//!
//! let decision = guardrails.validate_repository_access(
//!     "https://malicious.example/repo.git",
//!     RepositoryOperation::Clone,
//! );
//! assert!(!decision.valid);
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod scheduler;
pub mod security;
pub mod telemetry;
pub mod types;

pub use config::{CoreConfig, GuardrailConfig, PipelineConfig, SchedulerConfig};
pub use error::{AgentError, CoreError, RepositoryError, Result};
pub use outcome::Outcome;
pub use pipeline::{IssueEvent, PipelineRun, RemediationPipeline};
pub use scheduler::{Agent, AgentRegistry, Capabilities, TaskScheduler, TaskStatus};
pub use security::{SecurityGuardrails, SignatureVerifier};
pub use telemetry::{MetricKind, MetricRecord, MetricsSink, SharedSink};
pub use types::{
    AgentResult, CollaborativeResult, Priority, RiskLevel, SecurityDecision, Task, TaskId,
    TaskType,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
