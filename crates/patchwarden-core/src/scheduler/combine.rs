//! Merging agent outputs into one collaborative result

use serde_json::{json, Map, Value};

use crate::types::{AgentResult, TaskType};

/// List fields every task type merges
const COMMON_LISTS: &[&str] = &["suggestions", "findings"];

/// Extra list fields merged for specific task types
fn extra_lists(task_type: &TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::BugFix => &["root_causes", "fixes"],
        TaskType::SecurityReview => &["vulnerabilities"],
        TaskType::FeatureRequest => &["design_notes"],
        TaskType::IssueTriage => &["labels"],
        _ => &[],
    }
}

/// Combine successful agent outputs into one JSON document.
///
/// List fields are concatenated in agent order with duplicates dropped,
/// `confidence` is averaged over agents that reported one, and each
/// agent's `analysis` (if any) is kept under its name.
pub fn combine(task_type: &TaskType, results: &[AgentResult]) -> Value {
    let mut combined = Map::new();
    let mut contributors = Vec::new();
    let mut analyses = Map::new();
    let mut confidences = Vec::new();

    let fields: Vec<&str> = COMMON_LISTS
        .iter()
        .chain(extra_lists(task_type).iter())
        .copied()
        .collect();
    let mut lists: Vec<(&str, Vec<Value>)> = fields.iter().map(|f| (*f, Vec::new())).collect();

    for result in results.iter().filter(|r| r.success) {
        contributors.push(Value::String(result.agent_name.clone()));
        let output = match &result.result {
            Some(Value::Object(output)) => output,
            Some(other) => {
                analyses.insert(result.agent_name.clone(), other.clone());
                continue;
            }
            None => continue,
        };

        for (field, merged) in lists.iter_mut() {
            if let Some(items) = output.get(*field) {
                extend_unique(merged, items);
            }
        }

        if let Some(confidence) = output.get("confidence").and_then(Value::as_f64) {
            confidences.push(confidence.clamp(0.0, 1.0));
        }
        if let Some(analysis) = output.get("analysis") {
            analyses.insert(result.agent_name.clone(), analysis.clone());
        }
    }

    for (field, merged) in lists {
        combined.insert(field.to_string(), Value::Array(merged));
    }

    let confidence = if confidences.is_empty() {
        Value::Null
    } else {
        json!(confidences.iter().sum::<f64>() / confidences.len() as f64)
    };
    combined.insert("confidence".to_string(), confidence);
    combined.insert("analyses".to_string(), Value::Object(analyses));
    combined.insert("contributors".to_string(), Value::Array(contributors));
    combined.insert("task_type".to_string(), json!(task_type.as_str()));

    Value::Object(combined)
}

fn extend_unique(merged: &mut Vec<Value>, items: &Value) {
    let items = match items {
        Value::Array(items) => items.clone(),
        Value::Null => return,
        single => vec![single.clone()],
    };
    for item in items {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
}

/// Deterministic one-line summary of the run
pub fn summarize(task_type: &TaskType, results: &[AgentResult]) -> String {
    if results.is_empty() {
        return format!("No capable agents available for {} task", task_type);
    }

    let ok = results.iter().filter(|r| r.success).count();
    let mut summary = format!("{}/{} agents completed {} task", ok, results.len(), task_type);

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.agent_name.as_str())
        .collect();
    if !failed.is_empty() {
        summary.push_str(&format!("; failed: {}", failed.join(", ")));
    }
    summary
}

/// Follow-up recommendations derived from the success set and task type
pub fn recommend(task_type: &TaskType, results: &[AgentResult], combined: &Value) -> Vec<String> {
    let mut recommendations = Vec::new();

    if results.is_empty() {
        recommendations.push(format!(
            "Register an agent capable of handling {} tasks",
            task_type
        ));
        return recommendations;
    }

    let ok = results.iter().filter(|r| r.success).count();
    if ok == 0 {
        recommendations.push("All agents failed; inspect agent errors and retry the task".to_string());
        return recommendations;
    }
    if ok < results.len() {
        recommendations.push("Some agents failed; results may be incomplete".to_string());
    }

    let count = |field: &str| {
        combined
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    };

    match task_type {
        TaskType::CodeAnalysis if count("findings") > 0 => {
            recommendations.push(format!("Review {} reported findings", count("findings")))
        }
        TaskType::BugFix if count("fixes") > 0 => {
            recommendations.push("Validate proposed fixes with a regression test".to_string())
        }
        TaskType::BugFix => {
            recommendations.push("No fix proposed; gather a reproduction before retrying".to_string())
        }
        TaskType::SecurityReview if count("vulnerabilities") > 0 => recommendations.push(format!(
            "Address {} potential vulnerabilities before merging",
            count("vulnerabilities")
        )),
        TaskType::FeatureRequest => {
            recommendations.push("Break the design into reviewable increments".to_string())
        }
        TaskType::Documentation => {
            recommendations.push("Apply documentation updates alongside the code change".to_string())
        }
        TaskType::IssueTriage => {
            recommendations.push("Apply suggested labels and assign an owner".to_string())
        }
        _ => {}
    }

    if combined
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c < 0.5)
        .unwrap_or(false)
    {
        recommendations.push("Low agent confidence; request human review".to_string());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn ok(agent: &str, value: Value) -> AgentResult {
        AgentResult::succeeded(agent, TaskId::new(), value, 0.1)
    }

    #[test]
    fn test_merges_lists_and_averages_confidence() {
        let results = vec![
            ok("code_reviewer", json!({"findings": ["unused import"], "suggestions": ["split fn"], "confidence": 0.8})),
            ok("static_analyzer", json!({"findings": ["unused import", "dead code"], "confidence": 0.6})),
            AgentResult::failed("security_auditor", TaskId::new(), "offline", 0.0),
        ];

        let combined = combine(&TaskType::CodeAnalysis, &results);
        assert_eq!(combined["findings"], json!(["unused import", "dead code"]));
        assert_eq!(combined["suggestions"], json!(["split fn"]));
        assert!((combined["confidence"].as_f64().unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(combined["contributors"], json!(["code_reviewer", "static_analyzer"]));
    }

    #[test]
    fn test_type_specific_fields() {
        let results = vec![ok("bug_hunter", json!({"root_causes": ["off by one"], "fixes": ["use <="]}))];
        let combined = combine(&TaskType::BugFix, &results);
        assert_eq!(combined["root_causes"], json!(["off by one"]));
        assert!(combined.get("vulnerabilities").is_none());
        assert!(combined["confidence"].is_null());
    }

    #[test]
    fn test_summary_is_deterministic() {
        let results = vec![
            ok("a", json!({})),
            AgentResult::failed("b", TaskId::new(), "boom", 0.0),
        ];
        assert_eq!(
            summarize(&TaskType::Documentation, &results),
            "1/2 agents completed documentation task; failed: b"
        );
        assert_eq!(
            summarize(&TaskType::Documentation, &[]),
            "No capable agents available for documentation task"
        );
    }

    #[test]
    fn test_recommendations_follow_failures() {
        let all_failed = vec![AgentResult::failed("a", TaskId::new(), "x", 0.0)];
        let recs = recommend(&TaskType::BugFix, &all_failed, &Value::Null);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("All agents failed"));

        let results = vec![ok("security_auditor", json!({"vulnerabilities": ["sqli"], "confidence": 0.3}))];
        let combined = combine(&TaskType::SecurityReview, &results);
        let recs = recommend(&TaskType::SecurityReview, &results, &combined);
        assert!(recs.iter().any(|r| r.contains("1 potential vulnerabilities")));
        assert!(recs.iter().any(|r| r.contains("human review")));
    }
}
