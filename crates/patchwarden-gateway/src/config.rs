//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use patchwarden_core::{GuardrailConfig, PipelineConfig, SchedulerConfig, SignatureVerifier};

use crate::{GatewayError, Result, DEFAULT_HOST, DEFAULT_PORT};

/// Environment variable carrying the webhook secret
pub const SECRET_ENV: &str = "PATCHWARDEN_WEBHOOK_SECRET";

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    pub webhook: WebhookSettings,

    pub workers: WorkerSettings,

    /// Remote agents reachable over HTTP
    pub agents: Vec<AgentEndpoint>,

    pub guardrails: GuardrailConfig,

    pub scheduler: SchedulerConfig,

    pub pipeline: PipelineConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            webhook: WebhookSettings::default(),
            workers: WorkerSettings::default(),
            agents: Vec::new(),
            guardrails: GuardrailConfig::default(),
            scheduler: SchedulerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook.secret = Some(secret.into());
        self
    }

    /// Accept unsigned deliveries. Never enable outside tests.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.webhook.test_mode = test_mode;
        self
    }

    pub fn with_agent(mut self, agent: AgentEndpoint) -> Self {
        self.agents.push(agent);
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::InvalidConfig(format!("bad listen address: {}", e)))
    }

    /// Load configuration from a file: JSON for `.json`, TOML otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        Ok(config)
    }

    /// Fill the webhook secret from the environment when the file has none
    pub fn apply_env(mut self) -> Self {
        if self.webhook.secret.as_deref().map_or(true, str::is_empty) {
            if let Ok(secret) = std::env::var(SECRET_ENV) {
                self.webhook.secret = Some(secret);
            }
        }
        self
    }

    /// Signature verifier for the configured secret. Fails when no secret
    /// is set and test mode is off.
    pub fn verifier(&self) -> Result<SignatureVerifier> {
        Ok(SignatureVerifier::from_settings(
            self.webhook.secret.as_deref(),
            self.webhook.test_mode,
        )?)
    }
}

/// Webhook ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Shared HMAC secret
    pub secret: Option<String>,

    /// Skip signature verification
    pub test_mode: bool,

    /// Mean processing time above which a warning is logged (seconds)
    pub latency_target_secs: f64,

    /// Delivery records kept for inspection
    pub history_capacity: usize,

    /// Per-handler limit (seconds)
    pub handler_timeout_secs: u64,

    /// Issue label that opts an issue into autonomous remediation
    pub trigger_label: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            test_mode: false,
            latency_target_secs: 2.0,
            history_capacity: 1000,
            handler_timeout_secs: 10,
            trigger_label: "autofix".to_string(),
        }
    }
}

impl WebhookSettings {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

/// Background worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub workers: usize,

    pub queue_capacity: usize,

    /// Limit for one job (seconds)
    pub job_timeout_secs: u64,

    /// Finished pipeline runs kept for inspection
    pub run_history: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            job_timeout_secs: 1800,
            run_history: 100,
        }
    }
}

impl WorkerSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// A remote agent reachable over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub name: String,

    pub url: String,

    /// Task types the agent accepts; empty means any
    #[serde(default)]
    pub task_types: Vec<String>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_agent_timeout() -> u64 {
    60
}

impl AgentEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            task_types: Vec::new(),
            api_key: None,
            timeout_secs: default_agent_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.webhook.latency_target_secs, 2.0);
        assert!(!config.webhook.test_mode);
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfig::new()
            .with_host("0.0.0.0")
            .with_port(8080)
            .with_secret("s3cret");

        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert!(config.verifier().is_ok());
    }

    #[test]
    fn test_missing_secret_is_startup_error() {
        let config = GatewayConfig::default();
        assert!(config.verifier().is_err());
        assert!(config.with_test_mode(true).verifier().unwrap().is_bypassed());
    }

    #[test]
    fn test_bad_address() {
        let config = GatewayConfig::new().with_host("not an address");
        assert!(matches!(config.socket_addr(), Err(GatewayError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
port = 9000

[webhook]
secret = "from-file"
trigger_label = "bot-fix"

[[agents]]
name = "code_reviewer"
url = "http://localhost:7000/review"
task_types = ["code_analysis"]

[scheduler]
max_concurrent_agents = 2
"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.webhook.secret.as_deref(), Some("from-file"));
        assert_eq!(config.webhook.trigger_label, "bot-fix");
        assert_eq!(config.agents[0].timeout_secs, 60);
        assert_eq!(config.scheduler.max_concurrent_agents, 2);
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"port": 9100, "webhook": {{"test_mode": true}}}}"#).unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9100);
        assert!(config.webhook.test_mode);
    }
}
