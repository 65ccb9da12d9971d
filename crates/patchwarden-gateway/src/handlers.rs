//! Built-in event handlers
//!
//! [`TaskHandler`] turns repository activity into agent tasks;
//! [`RemediationHandler`] starts the autonomous fix pipeline for issues
//! that opt in with the trigger label.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use patchwarden_core::security::RepositoryOperation;
use patchwarden_core::{IssueEvent, Outcome, Priority, SecurityGuardrails, TaskScheduler, TaskType};

use crate::webhook::{ClassifiedEvent, EventHandler};
use crate::worker::{Job, JobQueue};

const ISSUE_ACTIONS: &[&str] = &["opened", "edited", "reopened"];
const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];
const URGENT_LABELS: &[&str] = &["bug", "critical", "security"];

fn label_names(payload: &Value) -> Vec<String> {
    payload
        .pointer("/issue/labels")
        .or_else(|| payload.pointer("/pull_request/labels"))
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str).or_else(|| l.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Creates scheduler tasks for issues, pull requests and pushes
pub struct TaskHandler {
    scheduler: Arc<TaskScheduler>,
    queue: JobQueue,
}

impl TaskHandler {
    pub fn new(scheduler: Arc<TaskScheduler>, queue: JobQueue) -> Self {
        Self { scheduler, queue }
    }

    /// Task to create for `event`, if any
    fn plan(event: &ClassifiedEvent) -> Option<(TaskType, Priority)> {
        let action = event.action.as_deref().unwrap_or_default();
        match event.event_type.as_str() {
            "issues" if ISSUE_ACTIONS.contains(&action) => {
                let urgent = label_names(&event.payload)
                    .iter()
                    .any(|l| URGENT_LABELS.contains(&l.to_lowercase().as_str()));
                let priority = if urgent { Priority::High } else { Priority::Medium };
                Some((TaskType::IssueTriage, priority))
            }
            "pull_request" if PULL_REQUEST_ACTIONS.contains(&action) => {
                Some((TaskType::CodeAnalysis, Priority::Medium))
            }
            "push" => Some((TaskType::CodeAnalysis, Priority::Low)),
            _ => None,
        }
    }
}

#[async_trait]
impl EventHandler for TaskHandler {
    fn name(&self) -> &str {
        "task"
    }

    fn handles(&self, event_type: &str) -> bool {
        matches!(event_type, "issues" | "pull_request" | "push")
    }

    async fn handle(&self, event: &ClassifiedEvent) -> Outcome<Value> {
        let (task_type, priority) = match Self::plan(event) {
            Some(plan) => plan,
            None => return Outcome::accepted(json!({ "skipped": true })),
        };

        let payload = json!({
            "event_type": event.event_type,
            "delivery_id": event.delivery_id,
            "repository": event.repository,
            "payload": event.payload,
        });
        let task_id = self
            .scheduler
            .create_task(task_type.clone(), payload, priority, None);

        if let Err(e) = self.queue.submit(Job::ProcessTask(task_id)) {
            let reason = format!("not scheduled: {}", e);
            self.scheduler.abandon(task_id, &reason);
            return Outcome::faulted(format!("task {} {}", task_id, reason));
        }
        Outcome::accepted(json!({
            "task_id": task_id,
            "task_type": task_type,
            "priority": priority,
        }))
    }
}

/// Starts remediation runs for issues carrying the trigger label
pub struct RemediationHandler {
    guardrails: Arc<SecurityGuardrails>,
    queue: JobQueue,
    trigger_label: String,
}

impl RemediationHandler {
    pub fn new(guardrails: Arc<SecurityGuardrails>, queue: JobQueue, trigger_label: impl Into<String>) -> Self {
        Self {
            guardrails,
            queue,
            trigger_label: trigger_label.into(),
        }
    }

    fn issue(&self, event: &ClassifiedEvent) -> Option<IssueEvent> {
        if !matches!(event.action.as_deref(), Some("opened" | "labeled")) {
            return None;
        }
        let labels = label_names(&event.payload);
        if !labels.iter().any(|l| l.eq_ignore_ascii_case(&self.trigger_label)) {
            return None;
        }

        let repository = event.repository.as_ref()?;
        let issue = event.payload.get("issue")?;
        Some(IssueEvent {
            repository_url: repository.clone_url()?,
            repository: repository.full_name.clone(),
            issue_number: issue.get("number").and_then(Value::as_u64)?,
            title: issue.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
            body: issue.get("body").and_then(Value::as_str).unwrap_or_default().to_string(),
            labels,
        })
    }
}

#[async_trait]
impl EventHandler for RemediationHandler {
    fn name(&self) -> &str {
        "remediation"
    }

    fn handles(&self, event_type: &str) -> bool {
        event_type == "issues"
    }

    async fn handle(&self, event: &ClassifiedEvent) -> Outcome<Value> {
        let issue = match self.issue(event) {
            Some(issue) => issue,
            None => return Outcome::accepted(json!({ "skipped": true })),
        };

        let decision = self
            .guardrails
            .validate_repository_access(&issue.repository_url, RepositoryOperation::Clone);
        if !decision.valid {
            tracing::warn!(
                "Remediation of {}#{} blocked: {}",
                issue.repository,
                issue.issue_number,
                decision.reason
            );
            return Outcome::from_decision(&decision);
        }

        let summary = json!({
            "repository": issue.repository,
            "issue_number": issue.issue_number,
            "queued": true,
        });
        match self.queue.submit(Job::Remediate(issue)) {
            Ok(()) => Outcome::accepted(summary),
            Err(e) => Outcome::faulted(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::RepositoryIdentity;
    use patchwarden_core::{AgentRegistry, RiskLevel, SchedulerConfig};
    use tokio::sync::mpsc;

    fn event(event_type: &str, payload: Value) -> ClassifiedEvent {
        ClassifiedEvent {
            delivery_id: "d-1".into(),
            event_type: event_type.into(),
            action: payload.get("action").and_then(Value::as_str).map(str::to_string),
            repository: Some(RepositoryIdentity {
                full_name: "acme/widgets".into(),
                clone_url: payload
                    .pointer("/repository/clone_url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                html_url: None,
                default_branch: None,
            }),
            payload,
        }
    }

    #[test]
    fn test_plan_maps_events_to_tasks() {
        let urgent = event("issues", json!({"action": "opened", "issue": {"labels": [{"name": "Bug"}]}}));
        assert_eq!(TaskHandler::plan(&urgent), Some((TaskType::IssueTriage, Priority::High)));

        let normal = event("issues", json!({"action": "edited", "issue": {"labels": []}}));
        assert_eq!(TaskHandler::plan(&normal), Some((TaskType::IssueTriage, Priority::Medium)));

        let pr = event("pull_request", json!({"action": "synchronize"}));
        assert_eq!(TaskHandler::plan(&pr), Some((TaskType::CodeAnalysis, Priority::Medium)));

        let push = event("push", json!({}));
        assert_eq!(TaskHandler::plan(&push), Some((TaskType::CodeAnalysis, Priority::Low)));

        let closed = event("issues", json!({"action": "closed"}));
        assert_eq!(TaskHandler::plan(&closed), None);
    }

    #[tokio::test]
    async fn test_task_handler_enqueues_job() {
        let scheduler = Arc::new(TaskScheduler::new(
            SchedulerConfig::default(),
            Arc::new(AgentRegistry::new()),
        ));
        let (queue, mut receiver) = JobQueue::channel(4);
        let handler = TaskHandler::new(scheduler.clone(), queue);

        let outcome = handler
            .handle(&event("push", json!({"ref": "refs/heads/main"})))
            .await;
        assert!(outcome.is_accepted());
        assert_eq!(scheduler.queue_len(), 1);
        assert!(matches!(receiver.try_recv(), Ok(Job::ProcessTask(_))));
    }

    #[tokio::test]
    async fn test_unscheduled_task_is_finished_as_failed() {
        let scheduler = Arc::new(TaskScheduler::new(
            SchedulerConfig::default(),
            Arc::new(AgentRegistry::new()),
        ));
        let (queue, _receiver) = JobQueue::channel(1);
        let handler = TaskHandler::new(scheduler.clone(), queue);
        let push = event("push", json!({"ref": "refs/heads/main"}));

        assert!(handler.handle(&push).await.is_accepted());
        let outcome = handler.handle(&push).await;
        assert!(outcome.is_faulted());

        // only the task that reached the work queue is still waiting
        assert_eq!(scheduler.queue_len(), 1);
        let stats = scheduler.get_performance_stats();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.successful_tasks, 0);
    }

    #[tokio::test]
    async fn test_remediation_requires_trigger_label() {
        let (queue, mut receiver) = JobQueue::channel(4);
        let handler = RemediationHandler::new(
            Arc::new(SecurityGuardrails::new(Default::default())),
            queue,
            "autofix",
        );
        let unlabeled = event(
            "issues",
            json!({"action": "opened", "issue": {"number": 1, "title": "x", "labels": []},
                   "repository": {"clone_url": "https://github.com/acme/widgets.git"}}),
        );
        let outcome = handler.handle(&unlabeled).await;
        assert_eq!(outcome.into_value(), Some(json!({"skipped": true})));
        assert!(matches!(receiver.try_recv(), Err(mpsc::error::TryRecvError::Empty)));

        let labeled = event(
            "issues",
            json!({"action": "labeled", "issue": {"number": 7, "title": "Crash", "labels": [{"name": "autofix"}]},
                   "repository": {"clone_url": "https://github.com/acme/widgets.git"}}),
        );
        assert!(handler.handle(&labeled).await.is_accepted());
        match receiver.try_recv() {
            Ok(Job::Remediate(issue)) => {
                assert_eq!(issue.issue_number, 7);
                assert_eq!(issue.repository, "acme/widgets");
            }
            other => panic!("unexpected job: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocked_repository_is_rejected() {
        let (queue, mut receiver) = JobQueue::channel(4);
        let handler = RemediationHandler::new(
            Arc::new(SecurityGuardrails::new(Default::default())),
            queue,
            "autofix",
        );
        let malicious = event(
            "issues",
            json!({"action": "opened", "issue": {"number": 2, "title": "pwn", "labels": ["autofix"]},
                   "repository": {"clone_url": "https://malicious.example/acme/widgets.git"}}),
        );

        let outcome = handler.handle(&malicious).await;
        assert_eq!(outcome.label(), "blocked");
        assert!(matches!(outcome, Outcome::Rejected { risk_level: RiskLevel::High, .. }));
        assert!(receiver.try_recv().is_err());
    }
}
