//! Configuration for the orchestration core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Priority, TaskType};
use crate::Result;

/// Top-level core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub guardrails: GuardrailConfig,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Security guardrail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Roots that absolute paths must live under
    pub allowed_roots: Vec<PathBuf>,

    /// Files larger than this are refused (bytes)
    pub max_file_size: u64,

    /// Patches larger than this are refused (bytes)
    pub max_patch_size: usize,

    /// Executables that may be run
    pub allowed_commands: Vec<String>,

    /// Executables that are never run
    pub denied_commands: Vec<String>,

    /// Code-hosting hosts repositories may come from
    pub trusted_hosts: Vec<String>,

    /// Domains that are always refused
    pub blocked_domains: Vec<String>,

    /// Audit ring buffer capacity
    pub audit_capacity: usize,

    /// Target for `(total - blocked) / total`
    pub success_rate_target: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            allowed_roots: vec![std::env::temp_dir()],
            max_file_size: 10 * 1024 * 1024,
            max_patch_size: 1024 * 1024,
            allowed_commands: ["git", "cargo", "go", "npm", "yarn", "pnpm", "pytest"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            denied_commands: [
                "rm", "sudo", "su", "doas", "chmod", "chown", "dd", "mkfs", "shutdown",
                "reboot", "curl", "wget", "nc", "ncat", "ssh", "scp", "eval", "exec", "kill",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            trusted_hosts: vec!["github.com".to_string()],
            blocked_domains: [
                "localhost",
                "127.0.0.1",
                "0.0.0.0",
                "169.254.169.254",
                "metadata.google.internal",
                "malicious.example",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            audit_capacity: 1000,
            success_rate_target: 0.95,
        }
    }
}

impl GuardrailConfig {
    pub fn with_allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.allowed_roots.push(root.into());
        self
    }

    pub fn with_trusted_host(mut self, host: impl Into<String>) -> Self {
        self.trusted_hosts.push(host.into());
        self
    }

    pub fn with_blocked_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.push(domain.into());
        self
    }

    pub fn with_allowed_command(mut self, command: impl Into<String>) -> Self {
        self.allowed_commands.push(command.into());
        self
    }
}

/// One entry of the agent weight table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub agent: String,
    pub priority: Priority,
    pub weight: f64,
}

/// Task scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on agents invoked at once for one task
    pub max_concurrent_agents: usize,

    /// Per-agent call timeout in seconds
    pub agent_timeout_secs: u64,

    /// Completed results kept before the oldest is evicted
    pub retention_limit: usize,

    /// Agent used for task types with no routing entry
    pub generic_agent: String,

    /// Task type name -> candidate agents, in preference order
    pub routing: HashMap<String, Vec<String>>,

    /// (agent, priority) weights; unlisted pairs use `default_weight`
    pub weights: Vec<WeightEntry>,

    pub default_weight: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let routing = [
            (
                TaskType::CodeAnalysis,
                vec!["code_reviewer", "static_analyzer", "security_auditor"],
            ),
            (TaskType::IssueTriage, vec!["triager", "code_reviewer"]),
            (
                TaskType::BugFix,
                vec!["bug_hunter", "code_reviewer", "test_engineer"],
            ),
            (
                TaskType::FeatureRequest,
                vec!["architect", "code_generator", "test_engineer"],
            ),
            (
                TaskType::SecurityReview,
                vec!["security_auditor", "code_reviewer"],
            ),
            (TaskType::Documentation, vec!["doc_writer", "code_reviewer"]),
        ]
        .into_iter()
        .map(|(t, agents)| {
            (
                t.as_str().to_string(),
                agents.into_iter().map(String::from).collect(),
            )
        })
        .collect();

        Self {
            max_concurrent_agents: 4,
            agent_timeout_secs: 120,
            retention_limit: 1000,
            generic_agent: "generalist".to_string(),
            routing,
            weights: Vec::new(),
            default_weight: 0.5,
        }
    }
}

impl SchedulerConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn with_route(mut self, task_type: TaskType, agents: &[&str]) -> Self {
        self.routing.insert(
            task_type.as_str().to_string(),
            agents.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_weight(mut self, agent: impl Into<String>, priority: Priority, weight: f64) -> Self {
        self.weights.push(WeightEntry {
            agent: agent.into(),
            priority,
            weight,
        });
        self
    }

    pub fn with_retention_limit(mut self, limit: usize) -> Self {
        self.retention_limit = limit;
        self
    }

    pub fn with_agent_timeout_secs(mut self, secs: u64) -> Self {
        self.agent_timeout_secs = secs;
        self
    }
}

/// Remediation pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory under which per-run checkouts are created
    pub workspace_root: PathBuf,

    pub clone_timeout_secs: u64,

    pub test_timeout_secs: u64,

    /// Minimum pass rate for a test run to meet its target
    pub pass_rate_target: f64,

    /// Target for successful runs over total runs
    pub success_rate_target: f64,

    /// Keep checkouts after a run finishes
    pub keep_workspaces: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("patchwarden"),
            clone_timeout_secs: 300,
            test_timeout_secs: 900,
            pass_rate_target: 0.85,
            success_rate_target: 0.90,
            keep_workspaces: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_test_timeout_secs(mut self, secs: u64) -> Self {
        self.test_timeout_secs = secs;
        self
    }

    pub fn with_clone_timeout_secs(mut self, secs: u64) -> Self {
        self.clone_timeout_secs = secs;
        self
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}
