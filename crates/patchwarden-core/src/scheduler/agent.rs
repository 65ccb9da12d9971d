//! Agent interface and capability registry
//!
//! Agents are opaque collaborators: the scheduler hands them a prompt and
//! receives a JSON value or an error. Which task types an agent may handle
//! is declared explicitly at registration time.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::AgentError;
use crate::types::{Priority, TaskId, TaskType};

/// Prompt delivered to one agent for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompt {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub priority: Priority,
    /// Agent the prompt was built for
    pub agent: String,
    pub instructions: String,
    pub context: serde_json::Value,
}

/// A specialised analysis agent
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent name used for routing and statistics
    fn name(&self) -> &str;

    /// Attempt the task described by `prompt`
    async fn try_handle(&self, prompt: &AgentPrompt) -> Result<serde_json::Value, AgentError>;
}

/// Task types an agent declares it can handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capabilities {
    /// Any task type, including custom ones
    Any,
    Only(HashSet<TaskType>),
}

impl Capabilities {
    pub fn only<I: IntoIterator<Item = TaskType>>(types: I) -> Self {
        Self::Only(types.into_iter().collect())
    }

    pub fn supports(&self, task_type: &TaskType) -> bool {
        match self {
            Capabilities::Any => true,
            Capabilities::Only(types) => types.contains(task_type),
        }
    }
}

struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    capabilities: Capabilities,
}

/// Registry of available agents and their declared capabilities
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<BTreeMap<String, RegisteredAgent>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent
    pub fn register(&self, agent: Arc<dyn Agent>, capabilities: Capabilities) {
        let name = agent.name().to_string();
        tracing::info!("Agent registered: {} ({:?})", name, capabilities);
        self.agents.write().insert(
            name,
            RegisteredAgent {
                agent,
                capabilities,
            },
        );
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.agents.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().get(name).map(|r| r.agent.clone())
    }

    /// Whether `name` is registered and declares support for `task_type`
    pub fn is_capable(&self, name: &str, task_type: &TaskType) -> bool {
        self.agents
            .read()
            .get(name)
            .map(|r| r.capabilities.supports(task_type))
            .unwrap_or(false)
    }

    pub fn capabilities(&self, name: &str) -> Option<Capabilities> {
        self.agents.read().get(name).map(|r| r.capabilities.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted agent for tests
    pub struct ScriptedAgent {
        pub name: String,
        pub reply: Result<serde_json::Value, String>,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl ScriptedAgent {
        pub fn ok(name: &str, reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                reply: Ok(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &str, error: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                reply: Err(error.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                reply: Ok(serde_json::json!({"late": true})),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn try_handle(&self, _prompt: &AgentPrompt) -> Result<serde_json::Value, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(|message| AgentError::Failed {
                agent: self.name.clone(),
                message,
            })
        }
    }
}
