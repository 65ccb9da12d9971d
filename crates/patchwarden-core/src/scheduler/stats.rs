//! Scheduler performance accounting

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AgentResult, CollaborativeResult};

/// Per-agent performance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub tasks_completed: u64,
    pub success_count: u64,
    /// Seconds
    pub total_time: f64,
    pub average_time: f64,
}

impl AgentStats {
    fn record(&mut self, result: &AgentResult) {
        self.tasks_completed += 1;
        if result.success {
            self.success_count += 1;
        }
        self.total_time += result.processing_time;
        self.average_time = self.total_time / self.tasks_completed as f64;
    }
}

/// Global scheduler performance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub success_rate: f64,
    /// Mean task wall-clock time in seconds
    pub average_processing_time: f64,
    pub queued: usize,
    pub active: usize,
    pub retained_results: usize,
    pub agents: BTreeMap<String, AgentStats>,
}

#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    total_tasks: u64,
    successful_tasks: u64,
    total_time: f64,
    agents: BTreeMap<String, AgentStats>,
}

impl StatsTracker {
    pub(crate) fn record(&mut self, result: &CollaborativeResult) {
        self.total_tasks += 1;
        if result.success {
            self.successful_tasks += 1;
        }
        self.total_time += result.total_time;
        for agent_result in &result.agent_results {
            self.agents
                .entry(agent_result.agent_name.clone())
                .or_default()
                .record(agent_result);
        }
    }

    pub(crate) fn snapshot(&self, queued: usize, active: usize, retained: usize) -> PerformanceStats {
        let (success_rate, average) = if self.total_tasks == 0 {
            (0.0, 0.0)
        } else {
            (
                self.successful_tasks as f64 / self.total_tasks as f64,
                self.total_time / self.total_tasks as f64,
            )
        };
        PerformanceStats {
            total_tasks: self.total_tasks,
            successful_tasks: self.successful_tasks,
            success_rate,
            average_processing_time: average,
            queued,
            active,
            retained_results: retained,
            agents: self.agents.clone(),
        }
    }
}
