//! Task scheduler
//!
//! Creates and tracks tasks, routes them to capable agents, fans the agent
//! calls out concurrently and merges whatever comes back. A task moves
//! queued -> active -> completed; completed results are immutable and kept
//! in a capped window, oldest evicted first.

pub mod agent;
pub mod combine;
pub mod prompt;
pub mod routing;
pub mod stats;
pub mod store;

pub use agent::{Agent, AgentPrompt, AgentRegistry, Capabilities};
pub use routing::{AgentWeighting, RoutingTable, WeightTable};
pub use stats::{AgentStats, PerformanceStats};
pub use store::{InMemoryTaskStore, TaskSnapshot, TaskStore};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::SchedulerConfig;
use crate::error::AgentError;
use crate::telemetry::{default_sink, MetricKind, MetricRecord, SharedSink};
use crate::types::{AgentResult, CollaborativeResult, Priority, Task, TaskId, TaskType};
use stats::StatsTracker;

/// Where a task currently is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting; `position` is 0-based from the head of the queue
    Queued { position: usize },
    Active,
    Completed { result: CollaborativeResult },
    NotFound,
}

#[derive(Default)]
struct SchedulerState {
    /// Queued and active tasks
    tasks: HashMap<TaskId, Task>,
    queue: VecDeque<TaskId>,
    active: HashSet<TaskId>,
    completed: HashMap<TaskId, CollaborativeResult>,
    completion_order: VecDeque<TaskId>,
    stats: StatsTracker,
}

impl SchedulerState {
    /// Move `id` from the queue to active
    fn activate(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.get(&id)?.clone();
        if let Some(pos) = self.queue.iter().position(|queued| *queued == id) {
            self.queue.remove(pos);
        }
        self.active.insert(id);
        Some(task)
    }

    fn complete(&mut self, result: CollaborativeResult, retention_limit: usize) {
        let id = result.task_id;
        self.active.remove(&id);
        self.tasks.remove(&id);
        self.stats.record(&result);
        self.completed.insert(id, result);
        self.completion_order.push_back(id);

        while self.completion_order.len() > retention_limit {
            if let Some(evicted) = self.completion_order.pop_front() {
                self.completed.remove(&evicted);
                tracing::debug!("Evicted completed task {}", evicted);
            }
        }
    }
}

/// Schedules tasks across registered agents
pub struct TaskScheduler {
    config: SchedulerConfig,
    registry: Arc<AgentRegistry>,
    routing: RoutingTable,
    weighting: Arc<dyn AgentWeighting>,
    state: Mutex<SchedulerState>,
    store: Option<Arc<dyn TaskStore>>,
    sink: SharedSink,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig, registry: Arc<AgentRegistry>) -> Self {
        let weighting = Arc::new(WeightTable::from_config(&config));
        let routing = RoutingTable::from_config(&config);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_agents.max(1)));
        Self {
            config,
            registry,
            routing,
            weighting,
            state: Mutex::new(SchedulerState::default()),
            store: None,
            sink: default_sink(),
            permits,
        }
    }

    /// Snapshot created tasks to `store`
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the configured weight table
    pub fn with_weighting(mut self, weighting: Arc<dyn AgentWeighting>) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Create and enqueue a task. Never blocks on the snapshot store.
    pub fn create_task(
        &self,
        task_type: impl Into<TaskType>,
        payload: serde_json::Value,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
    ) -> TaskId {
        let mut task = Task::new(task_type.into(), payload, priority);
        task.deadline = deadline;
        self.submit(task)
    }

    /// Enqueue an already-built task
    pub fn submit(&self, task: Task) -> TaskId {
        let id = task.id;
        tracing::info!("Task created: {} ({}, {})", id, task.task_type, task.priority);

        if let Some(store) = &self.store {
            self.spawn_snapshot(store.clone(), task.clone());
        }

        let mut state = self.state.lock();
        state.queue.push_back(id);
        state.tasks.insert(id, task);
        id
    }

    fn spawn_snapshot(&self, store: Arc<dyn TaskStore>, task: Task) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let importance = task.priority.importance();
                    if let Err(e) = store.snapshot(&task, importance).await {
                        tracing::warn!("Task snapshot failed for {}: {}", task.id, e);
                    }
                });
            }
            Err(_) => tracing::debug!("No runtime available; skipping snapshot of {}", task.id),
        }
    }

    /// Candidate agents for `task`, capable ones only, heaviest first
    pub fn select_agents_for_task(&self, task: &Task) -> Vec<String> {
        let capable: Vec<String> = self
            .routing
            .candidates(&task.task_type)
            .into_iter()
            .filter(|agent| self.registry.is_capable(agent, &task.task_type))
            .collect();

        let capable = if capable.is_empty() {
            let generic = self.routing.generic_agent();
            if self.registry.is_capable(generic, &task.task_type) {
                vec![generic.to_string()]
            } else {
                capable
            }
        } else {
            capable
        };

        routing::order_by_weight(capable, task.priority, self.weighting.as_ref())
    }

    /// Process a task by id. Failures are reported in the returned result.
    pub async fn process_task(&self, id: TaskId) -> CollaborativeResult {
        match self.claim(id) {
            Ok(task) => self.run(task).await,
            Err(result) => result,
        }
    }

    /// Like [`process_task`](Self::process_task), but gives up after
    /// `deadline`. An expired task still completes, as a failed result.
    pub async fn process_task_with_deadline(
        &self,
        id: TaskId,
        deadline: Duration,
    ) -> CollaborativeResult {
        let task = match self.claim(id) {
            Ok(task) => task,
            Err(result) => return result,
        };
        let started = Instant::now();
        match tokio::time::timeout(deadline, self.run(task)).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("timed out after {:?}", deadline);
                tracing::warn!("Task {} {}", id, message);
                let result =
                    CollaborativeResult::failure(id, message, started.elapsed().as_secs_f64());
                self.finish(&result, false);
                result
            }
        }
    }

    /// Finish a queued task without running it. Returns `false` when the
    /// task is not queued.
    pub fn abandon(&self, id: TaskId, reason: &str) -> bool {
        let result = {
            let mut state = self.state.lock();
            if state.activate(id).is_none() {
                return false;
            }
            CollaborativeResult::failure(id, reason, 0.0)
        };
        tracing::warn!("Task {} abandoned: {}", id, reason);
        self.finish(&result, false);
        true
    }

    fn claim(&self, id: TaskId) -> std::result::Result<Task, CollaborativeResult> {
        let mut state = self.state.lock();
        if let Some(done) = state.completed.get(&id) {
            return Err(done.clone());
        }
        if state.active.contains(&id) {
            return Err(CollaborativeResult::failure(
                id,
                "task is already being processed",
                0.0,
            ));
        }
        state
            .activate(id)
            .ok_or_else(|| CollaborativeResult::failure(id, "task not found", 0.0))
    }

    /// Process the oldest queued task, if any
    pub async fn process_next(&self) -> Option<CollaborativeResult> {
        let task = {
            let mut state = self.state.lock();
            let id = state.queue.front().copied()?;
            state.activate(id)
        }?;
        Some(self.run(task).await)
    }

    async fn run(&self, task: Task) -> CollaborativeResult {
        let started = Instant::now();
        if task.is_overdue() {
            tracing::warn!("Task {} started after its deadline", task.id);
        }

        let agents = self.select_agents_for_task(&task);
        tracing::info!("Processing task {} with agents {:?}", task.id, agents);

        let agent_results = self.dispatch(&task, &agents).await;

        let combined = combine::combine(&task.task_type, &agent_results);
        let success = agent_results.iter().any(|r| r.success);
        let summary = combine::summarize(&task.task_type, &agent_results);
        let recommendations = combine::recommend(&task.task_type, &agent_results, &combined);
        let total_time = started.elapsed().as_secs_f64();

        let result = CollaborativeResult {
            task_id: task.id,
            agent_results,
            combined_result: combined,
            success,
            total_time,
            summary,
            recommendations,
        };

        tracing::info!("Task {} completed: {}", task.id, result.summary);
        self.finish(&result, !task.is_overdue());
        result
    }

    fn finish(&self, result: &CollaborativeResult, on_time: bool) {
        self.sink.record(MetricRecord::new(
            MetricKind::TaskCompleted,
            result.task_id.to_string(),
            result.total_time,
            if result.success { "success" } else { "failed" },
            result.success && on_time,
        ));
        self.state
            .lock()
            .complete(result.clone(), self.config.retention_limit);
    }

    /// Invoke every agent concurrently and wait for all of them
    async fn dispatch(&self, task: &Task, agents: &[String]) -> Vec<AgentResult> {
        let timeout = self.config.agent_timeout();
        let timeout_secs = self.config.agent_timeout_secs;

        let handles = agents.iter().map(|name| {
            let name = name.clone();
            let task_id = task.id;
            let agent = self.registry.get(&name);
            let prompt = prompt::build_prompt(task, &name);
            let permits = self.permits.clone();

            let handle = tokio::spawn({
                let name = name.clone();
                async move {
                    let agent = match agent {
                        Some(agent) => agent,
                        None => {
                            let error = AgentError::NotRegistered(name.clone());
                            return AgentResult::failed(name, task_id, error.to_string(), 0.0);
                        }
                    };
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return AgentResult::failed(name, task_id, e.to_string(), 0.0),
                    };

                    let started = Instant::now();
                    let outcome = tokio::time::timeout(timeout, agent.try_handle(&prompt)).await;
                    let elapsed = started.elapsed().as_secs_f64();

                    match outcome {
                        Ok(Ok(value)) => AgentResult::succeeded(name, task_id, value, elapsed),
                        Ok(Err(e)) => {
                            tracing::warn!("Agent {} failed on task {}: {}", name, task_id, e);
                            AgentResult::failed(name, task_id, e.to_string(), elapsed)
                        }
                        Err(_) => {
                            let error = AgentError::TimedOut {
                                agent: name.clone(),
                                seconds: timeout_secs,
                            };
                            tracing::warn!("{}", error);
                            AgentResult::failed(name, task_id, error.to_string(), elapsed)
                        }
                    }
                }
            });
            (name, handle)
        });

        let (names, handles): (Vec<String>, Vec<_>) = handles.unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| {
                joined.unwrap_or_else(|_| {
                    let error = AgentError::Panicked(name.clone());
                    tracing::error!("{}", error);
                    AgentResult::failed(name, task.id, error.to_string(), 0.0)
                })
            })
            .collect()
    }

    /// Current status of a task. Unknown or evicted ids are `NotFound`.
    pub fn get_task_status(&self, id: TaskId) -> TaskStatus {
        let state = self.state.lock();
        if let Some(result) = state.completed.get(&id) {
            return TaskStatus::Completed {
                result: result.clone(),
            };
        }
        if state.active.contains(&id) {
            return TaskStatus::Active;
        }
        match state.queue.iter().position(|queued| *queued == id) {
            Some(position) => TaskStatus::Queued { position },
            None => TaskStatus::NotFound,
        }
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        let state = self.state.lock();
        state
            .stats
            .snapshot(state.queue.len(), state.active.len(), state.completed.len())
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}
