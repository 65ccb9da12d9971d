//! External task snapshot store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Task, TaskId};
use crate::Result;

/// Snapshot of a task as written to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task: Task,
    /// Importance score derived from priority
    pub importance: f64,
    pub stored_at: DateTime<Utc>,
}

/// Persistence for task snapshots
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn snapshot(&self, task: &Task, importance: f64) -> Result<()>;

    async fn load(&self, id: TaskId) -> Result<Option<TaskSnapshot>>;
}

/// Store that keeps snapshots in memory
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    snapshots: RwLock<HashMap<TaskId, TaskSnapshot>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn snapshot(&self, task: &Task, importance: f64) -> Result<()> {
        self.snapshots.write().insert(
            task.id,
            TaskSnapshot {
                task: task.clone(),
                importance,
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load(&self, id: TaskId) -> Result<Option<TaskSnapshot>> {
        Ok(self.snapshots.read().get(&id).cloned())
    }
}
