//! Core data model shared by the scheduler, guardrails and pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique, immutable task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Importance score used when snapshotting a task to the external store
    pub fn importance(&self) -> f64 {
        match self {
            Priority::High => 1.0,
            Priority::Medium => 0.7,
            Priority::Low => 0.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a task asks the agents to perform.
///
/// Unknown type names are preserved in [`TaskType::Custom`] and routed to the
/// generic agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    CodeAnalysis,
    IssueTriage,
    BugFix,
    FeatureRequest,
    SecurityReview,
    Documentation,
    Custom(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::CodeAnalysis => "code_analysis",
            TaskType::IssueTriage => "issue_triage",
            TaskType::BugFix => "bug_fix",
            TaskType::FeatureRequest => "feature_request",
            TaskType::SecurityReview => "security_review",
            TaskType::Documentation => "documentation",
            TaskType::Custom(name) => name,
        }
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        match s {
            "code_analysis" => TaskType::CodeAnalysis,
            "issue_triage" => TaskType::IssueTriage,
            "bug_fix" => TaskType::BugFix,
            "feature_request" => TaskType::FeatureRequest,
            "security_review" => TaskType::SecurityReview,
            "documentation" => TaskType::Documentation,
            other => TaskType::Custom(other.to_string()),
        }
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        TaskType::from(s.as_str())
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work handed to the agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(task_type: TaskType, payload: serde_json::Value, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            payload,
            priority,
            created_at: Utc::now(),
            deadline: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the deadline (if any) has passed
    pub fn is_overdue(&self) -> bool {
        self.deadline.map(|d| Utc::now() > d).unwrap_or(false)
    }
}

/// Output of a single agent for a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub task_id: TaskId,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Seconds spent in the agent call
    pub processing_time: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResult {
    pub fn succeeded(
        agent_name: impl Into<String>,
        task_id: TaskId,
        result: serde_json::Value,
        processing_time: f64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_id,
            success: true,
            result: Some(result),
            error: None,
            processing_time,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(
        agent_name: impl Into<String>,
        task_id: TaskId,
        error: impl Into<String>,
        processing_time: f64,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_id,
            success: false,
            result: None,
            error: Some(error.into()),
            processing_time,
            metadata: HashMap::new(),
        }
    }
}

/// Combined output of all agents participating in one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeResult {
    pub task_id: TaskId,
    pub agent_results: Vec<AgentResult>,
    pub combined_result: serde_json::Value,
    pub success: bool,
    /// Wall-clock seconds for the whole task
    pub total_time: f64,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl CollaborativeResult {
    /// A failed result carrying only an error description
    pub fn failure(task_id: TaskId, error: impl Into<String>, total_time: f64) -> Self {
        let error = error.into();
        Self {
            task_id,
            agent_results: Vec::new(),
            combined_result: serde_json::json!({ "error": error }),
            success: false,
            total_time,
            summary: format!("Task failed: {}", error),
            recommendations: vec!["Inspect the task error and resubmit".to_string()],
        }
    }
}

/// Risk attached to a security decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("low"),
            RiskLevel::Medium => f.write_str("medium"),
            RiskLevel::High => f.write_str("high"),
        }
    }
}

/// Verdict of one guardrail validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDecision {
    pub valid: bool,
    pub reason: String,
    pub risk_level: RiskLevel,
}

impl SecurityDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
            risk_level: RiskLevel::Low,
        }
    }

    pub fn deny(reason: impl Into<String>, risk_level: RiskLevel) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
            risk_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trips_custom_names() {
        assert_eq!(TaskType::from("bug_fix"), TaskType::BugFix);
        let custom = TaskType::from("dependency_bump");
        assert_eq!(custom, TaskType::Custom("dependency_bump".to_string()));

        let json = serde_json::to_string(&custom).unwrap();
        assert_eq!(json, "\"dependency_bump\"");
    }

    #[test]
    fn test_priority_importance() {
        assert_eq!(Priority::High.importance(), 1.0);
        assert_eq!(Priority::Medium.importance(), 0.7);
        assert_eq!(Priority::Low.importance(), 0.4);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new(TaskType::CodeAnalysis, serde_json::json!({}), Priority::High);
        let b = Task::new(TaskType::CodeAnalysis, serde_json::json!({}), Priority::High);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_task_serializes_type_field() {
        let task = Task::new(TaskType::SecurityReview, serde_json::json!({"x": 1}), Priority::Low);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "security_review");
        assert_eq!(value["priority"], "low");
    }

    #[test]
    fn test_overdue() {
        let task = Task::new(TaskType::BugFix, serde_json::json!({}), Priority::Medium)
            .with_deadline(Utc::now() - chrono::Duration::seconds(5));
        assert!(task.is_overdue());
    }
}
