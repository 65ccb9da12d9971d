//! Remote agents reached over HTTP

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use patchwarden_core::scheduler::AgentPrompt;
use patchwarden_core::{Agent, AgentError, AgentRegistry, Capabilities, TaskType};

use crate::config::AgentEndpoint;
use crate::Result;

/// Agent that POSTs its prompt as JSON and expects a JSON reply
#[derive(Debug, Clone)]
pub struct HttpAgent {
    name: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAgent {
    pub fn new(endpoint: &AgentEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            api_key: endpoint.api_key.clone(),
            client,
        })
    }

    fn failed(&self, message: impl Into<String>) -> AgentError {
        AgentError::Failed {
            agent: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_handle(&self, prompt: &AgentPrompt) -> std::result::Result<serde_json::Value, AgentError> {
        let mut request = self.client.post(&self.url).json(prompt);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failed(format!("HTTP {}: {}", status, body.trim())));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| self.failed(format!("invalid JSON reply: {}", e)))
    }
}

/// Register an [`HttpAgent`] for every endpoint
pub fn register_endpoints(registry: &AgentRegistry, endpoints: &[AgentEndpoint]) -> Result<usize> {
    for endpoint in endpoints {
        let capabilities = if endpoint.task_types.is_empty() {
            Capabilities::Any
        } else {
            Capabilities::only(endpoint.task_types.iter().map(|t| TaskType::from(t.as_str())))
        };
        registry.register(Arc::new(HttpAgent::new(endpoint)?), capabilities);
    }
    Ok(endpoints.len())
}
