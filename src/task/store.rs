//! In-memory task store.
//!
//! Invariants:
//! - Ids are `<prefix>_<uuid>` and never reused.
//! - Terminal states (`completed`, `failed`, `cancelled`) are final; later
//!   transitions are ignored and reported as `false`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::llm::TokenUsage;

/// Kind of analysis a task performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ProcessDiscovery,
    WorkflowOptimization,
}

impl TaskKind {
    /// Prefix used in task ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::ProcessDiscovery => "discover",
            Self::WorkflowOptimization => "optimize",
        }
    }

    /// Generate a fresh, collision-resistant task id.
    pub fn new_task_id(&self) -> String {
        format!("{}_{}", self.id_prefix(), Uuid::new_v4().simple())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything known about a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Wall time spent running, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(id: String, kind: TaskKind, input: Value) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            input,
            result: None,
            error: None,
            model: None,
            usage: None,
            execution_time_ms: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Successful outcome of a task.
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    pub result: Map<String, Value>,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

struct Entry {
    record: TaskRecord,
    cancel: CancellationToken,
}

/// Keyed store of task records, shared between handlers and workers.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Entry>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending task unless `max_in_flight` tasks are already
    /// pending or running, in which case the limit is returned as the error.
    pub async fn try_create(
        &self,
        kind: TaskKind,
        input: Value,
        cancel: CancellationToken,
        max_in_flight: usize,
    ) -> Result<String, usize> {
        let mut tasks = self.tasks.write().await;
        let in_flight = tasks
            .values()
            .filter(|e| !e.record.status.is_terminal())
            .count();
        if in_flight >= max_in_flight {
            return Err(max_in_flight);
        }
        let mut id = kind.new_task_id();
        while tasks.contains_key(&id) {
            id = kind.new_task_id();
        }
        let record = TaskRecord::new(id.clone(), kind, input);
        tasks.insert(id.clone(), Entry { record, cancel });
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(id).map(|e| e.record.clone())
    }

    /// All records, newest first.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.read().await;
        let mut records: Vec<TaskRecord> = tasks.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        records
    }

    /// Number of tasks that are pending or running.
    pub async fn in_flight(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|e| !e.record.status.is_terminal())
            .count()
    }

    /// Move a pending task to running.
    pub async fn mark_running(&self, id: &str) -> bool {
        self.update(id, |record| {
            if record.status != TaskStatus::Pending {
                return false;
            }
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
            true
        })
        .await
    }

    pub async fn complete(&self, id: &str, output: TaskOutput) -> bool {
        self.finish(id, TaskStatus::Completed, |record| {
            record.result = Some(output.result);
            record.model = output.model;
            record.usage = output.usage;
        })
        .await
    }

    pub async fn fail(&self, id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        self.finish(id, TaskStatus::Failed, |record| record.error = Some(error))
            .await
    }

    pub async fn mark_cancelled(&self, id: &str) -> bool {
        self.finish(id, TaskStatus::Cancelled, cancelled).await
    }

    /// Cancel a task: the record becomes `cancelled` and its worker is
    /// signalled in the same critical section.
    ///
    /// Returns `None` for an unknown id, otherwise the record as it stands
    /// afterwards. A task that had already finished is left untouched.
    pub async fn cancel(&self, id: &str) -> Option<TaskRecord> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks.get_mut(id)?;
        if finish_record(&mut entry.record, TaskStatus::Cancelled, cancelled) {
            entry.cancel.cancel();
        }
        Some(entry.record.clone())
    }

    /// Remove finished tasks whose completion is older than `ttl`.
    pub async fn prune_finished(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, entry| match entry.record.completed_at {
            // A negative age (clock skew) fails `to_std` and keeps the record.
            Some(done) => (now - done).to_std().map_or(true, |age| age < ttl),
            None => true,
        });
        before - tasks.len()
    }

    async fn finish<F>(&self, id: &str, status: TaskStatus, apply: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        self.update(id, |record| finish_record(record, status, apply))
            .await
    }

    async fn update<F>(&self, id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut TaskRecord) -> bool,
    {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(entry) => apply(&mut entry.record),
            None => false,
        }
    }
}

fn cancelled(record: &mut TaskRecord) {
    record.error = Some("Task was cancelled".to_string());
}

/// Move a record into a terminal state. No-op on an already finished record.
fn finish_record<F>(record: &mut TaskRecord, status: TaskStatus, apply: F) -> bool
where
    F: FnOnce(&mut TaskRecord),
{
    if record.status.is_terminal() {
        return false;
    }
    let now = Utc::now();
    record.status = status;
    record.completed_at = Some(now);
    record.execution_time_ms = record
        .started_at
        .map(|start| (now - start).num_milliseconds().max(0) as u64);
    apply(record);
    true
}

/// Shared task store wrapped in Arc for concurrent access.
pub type SharedTaskStore = Arc<TaskStore>;
