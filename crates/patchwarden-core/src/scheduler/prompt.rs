//! Task-type-specific prompt construction

use super::agent::AgentPrompt;
use crate::types::{Task, TaskType};

/// Build the prompt `agent` receives for `task`
pub fn build_prompt(task: &Task, agent: &str) -> AgentPrompt {
    let goal = match &task.task_type {
        TaskType::CodeAnalysis => {
            "Analyze the referenced code for defects, risky patterns and maintainability problems. \
             Report `findings` (list), `suggestions` (list) and a `confidence` between 0 and 1."
                .to_string()
        }
        TaskType::IssueTriage => {
            "Triage the issue: classify it, estimate severity and point at the likely affected \
             components. Report `findings`, `suggestions`, `labels` and a `confidence`."
                .to_string()
        }
        TaskType::BugFix => {
            "Locate the root cause of the reported bug and propose a minimal fix. Report \
             `root_causes`, `fixes`, `suggestions` and a `confidence`."
                .to_string()
        }
        TaskType::FeatureRequest => {
            "Outline how to implement the requested feature with the smallest reviewable change. \
             Report `design_notes`, `suggestions` and a `confidence`."
                .to_string()
        }
        TaskType::SecurityReview => {
            "Review the change for security issues: injection, unsafe deserialization, secrets \
             and privilege problems. Report `vulnerabilities`, `findings`, `suggestions` and a \
             `confidence`."
                .to_string()
        }
        TaskType::Documentation => {
            "Identify missing or outdated documentation and draft improvements. Report \
             `suggestions`, `findings` and a `confidence`."
                .to_string()
        }
        TaskType::Custom(name) => format!(
            "Handle the '{}' task described in the context. Report `findings`, `suggestions` \
             and a `confidence`.",
            name
        ),
    };

    let mut instructions = format!(
        "You are the {} agent. Priority: {}.\n{}",
        agent, task.priority, goal
    );
    if let Some(deadline) = task.deadline {
        instructions.push_str(&format!("\nRespond before {}.", deadline.to_rfc3339()));
    }

    AgentPrompt {
        task_id: task.id,
        task_type: task.task_type.clone(),
        priority: task.priority,
        agent: agent.to_string(),
        instructions,
        context: serde_json::json!({
            "payload": task.payload,
            "metadata": task.metadata,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    #[test]
    fn test_prompt_is_task_type_specific() {
        let bug = Task::new(TaskType::BugFix, serde_json::json!({"title": "crash"}), Priority::High);
        let prompt = build_prompt(&bug, "bug_hunter");
        assert!(prompt.instructions.contains("root cause"));
        assert!(prompt.instructions.contains("bug_hunter"));
        assert_eq!(prompt.context["payload"]["title"], "crash");

        let custom = Task::new(TaskType::Custom("license_audit".into()), serde_json::json!({}), Priority::Low);
        let prompt = build_prompt(&custom, "generalist");
        assert!(prompt.instructions.contains("license_audit"));
    }
}
