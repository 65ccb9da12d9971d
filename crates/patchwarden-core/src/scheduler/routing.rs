//! Agent selection: candidate routing and priority weighting

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::types::{Priority, TaskType};

/// Weight of an agent for a task priority; higher runs first
pub trait AgentWeighting: Send + Sync {
    fn weight(&self, agent: &str, priority: Priority) -> f64;
}

impl<F> AgentWeighting for F
where
    F: Fn(&str, Priority) -> f64 + Send + Sync,
{
    fn weight(&self, agent: &str, priority: Priority) -> f64 {
        self(agent, priority)
    }
}

/// Table-driven weighting with a default for unlisted pairs
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: HashMap<(String, Priority), f64>,
    default_weight: f64,
}

impl WeightTable {
    pub fn new(default_weight: f64) -> Self {
        Self {
            weights: HashMap::new(),
            default_weight,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        let mut table = Self::new(config.default_weight);
        for entry in &config.weights {
            table.set(entry.agent.clone(), entry.priority, entry.weight);
        }
        table
    }

    pub fn set(&mut self, agent: impl Into<String>, priority: Priority, weight: f64) {
        self.weights.insert((agent.into(), priority), weight);
    }
}

impl AgentWeighting for WeightTable {
    fn weight(&self, agent: &str, priority: Priority) -> f64 {
        self.weights
            .get(&(agent.to_string(), priority))
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Static task type -> candidate agents table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Vec<String>>,
    generic_agent: String,
}

impl RoutingTable {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            routes: config.routing.clone(),
            generic_agent: config.generic_agent.clone(),
        }
    }

    /// Candidates for `task_type`; unknown types fall back to the generic agent
    pub fn candidates(&self, task_type: &TaskType) -> Vec<String> {
        match self.routes.get(task_type.as_str()) {
            Some(agents) if !agents.is_empty() => agents.clone(),
            _ => vec![self.generic_agent.clone()],
        }
    }

    pub fn generic_agent(&self) -> &str {
        &self.generic_agent
    }
}

/// Order `agents` by descending weight. Ties keep their table order.
pub fn order_by_weight(
    mut agents: Vec<String>,
    priority: Priority,
    weighting: &dyn AgentWeighting,
) -> Vec<String> {
    agents.sort_by(|a, b| {
        let wa = weighting.weight(a, priority);
        let wb = weighting.weight(b, priority);
        wb.partial_cmp(&wa).unwrap_or(Ordering::Equal)
    });
    agents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_falls_back_to_generic() {
        let table = RoutingTable::from_config(&SchedulerConfig::default());
        assert_eq!(
            table.candidates(&TaskType::Custom("translate".into())),
            vec!["generalist".to_string()]
        );
        assert_eq!(table.candidates(&TaskType::CodeAnalysis)[0], "code_reviewer");
    }

    #[test]
    fn test_weight_table_defaults() {
        let config = SchedulerConfig::default().with_weight("security_auditor", Priority::High, 0.9);
        let weights = WeightTable::from_config(&config);
        assert_eq!(weights.weight("security_auditor", Priority::High), 0.9);
        assert_eq!(weights.weight("security_auditor", Priority::Low), 0.5);
        assert_eq!(weights.weight("nobody", Priority::Medium), 0.5);
    }

    #[test]
    fn test_order_is_descending_and_stable() {
        let mut weights = WeightTable::new(0.5);
        weights.set("c", Priority::High, 0.8);
        weights.set("a", Priority::High, 0.2);

        let ordered = order_by_weight(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            Priority::High,
            &weights,
        );
        assert_eq!(ordered, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_closure_weighting() {
        let by_length = |agent: &str, _p: Priority| agent.len() as f64;
        let ordered = order_by_weight(vec!["ab".into(), "abcd".into()], Priority::Low, &by_length);
        assert_eq!(ordered, vec!["abcd", "ab"]);
    }
}
