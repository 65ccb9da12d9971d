//! Background work queue
//!
//! Webhook handlers must answer quickly, so anything slow (agent fan-out,
//! remediation runs) is pushed onto a bounded channel drained by a fixed
//! pool of workers.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use patchwarden_core::{IssueEvent, PipelineRun, RemediationPipeline, TaskId, TaskScheduler};

use crate::config::WorkerSettings;
use crate::{GatewayError, Result};

/// Unit of background work
#[derive(Debug, Clone)]
pub enum Job {
    ProcessTask(TaskId),
    Remediate(IssueEvent),
}

impl Job {
    fn describe(&self) -> String {
        match self {
            Job::ProcessTask(id) => format!("task {}", id),
            Job::Remediate(issue) => format!("remediation of {}#{}", issue.repository, issue.issue_number),
        }
    }
}

/// Cloneable producer side of the work queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    submitted: Arc<AtomicU64>,
}

impl JobQueue {
    /// Bounded queue and its consuming end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            submitted: Arc::new(AtomicU64::new(0)),
        };
        (queue, receiver)
    }

    /// Enqueue without waiting. A full queue is an error, not back-pressure.
    pub fn submit(&self, job: Job) -> Result<()> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                tracing::warn!("Work queue full; dropping {}", job.describe());
                GatewayError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => GatewayError::QueueClosed,
        })?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Worker counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    pub workers: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

struct WorkerContext {
    scheduler: Arc<TaskScheduler>,
    pipeline: Arc<RemediationPipeline>,
    job_timeout: Duration,
    counters: Counters,
    runs: Mutex<VecDeque<PipelineRun>>,
    run_history: usize,
}

impl WorkerContext {
    /// Run one job. The deadline is enforced inside the scheduler and the
    /// pipeline so an expired job still ends with a recorded result.
    async fn execute(&self, job: Job) {
        let label = job.describe();
        let started = Instant::now();
        let success = match job {
            Job::ProcessTask(id) => {
                self.scheduler
                    .process_task_with_deadline(id, self.job_timeout)
                    .await
                    .success
            }
            Job::Remediate(issue) => {
                let run = self
                    .pipeline
                    .execute_autonomous_fix_with_deadline(issue, self.job_timeout)
                    .await;
                let success = run.success;
                let mut runs = self.runs.lock();
                runs.push_back(run);
                while runs.len() > self.run_history {
                    runs.pop_front();
                }
                success
            }
        };

        if success {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Finished {}", label);
        } else if started.elapsed() >= self.job_timeout {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            tracing::error!("{} exceeded {:?}", label, self.job_timeout);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Finished {} without success", label);
        }
    }
}

/// Fixed-size pool draining the work queue
pub struct WorkerPool {
    queue: JobQueue,
    context: Arc<WorkerContext>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start(
        settings: &WorkerSettings,
        scheduler: Arc<TaskScheduler>,
        pipeline: Arc<RemediationPipeline>,
    ) -> Self {
        let (queue, receiver) = JobQueue::channel(settings.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let context = Arc::new(WorkerContext {
            scheduler,
            pipeline,
            job_timeout: settings.job_timeout(),
            counters: Counters::default(),
            runs: Mutex::new(VecDeque::new()),
            run_history: settings.run_history.max(1),
        });

        let handles = (0..settings.workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => context.execute(job).await,
                            None => break,
                        }
                    }
                    tracing::debug!("Worker {} stopped", worker);
                })
            })
            .collect::<Vec<_>>();
        tracing::info!("Started {} workers", handles.len());

        Self {
            queue,
            context,
            handles,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Most recent remediation runs, newest first
    pub fn recent_runs(&self, count: usize) -> Vec<PipelineRun> {
        self.context.runs.lock().iter().rev().take(count).cloned().collect()
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.context.counters;
        WorkerStats {
            workers: self.handles.len(),
            submitted: self.queue.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
