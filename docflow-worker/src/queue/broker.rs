//! Broker abstraction
//!
//! The producer and the dispatcher talk to the task store only through
//! [`Broker`], so the SQLite implementation can be swapped without touching
//! handlers.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use docflow_common::Result;

use crate::tasks::{QueueName, TaskKind, TaskOptions};

/// Lifecycle state of a stored task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Active,
    Retry,
    Completed,
    Archived,
}

impl TaskState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Retry => "retry",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "retry" => Some(Self::Retry),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task ready to hand to the broker
#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    /// Serialized payload body
    pub payload: String,
    pub options: TaskOptions,
}

/// Broker receipt for an enqueued task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub id: String,
    pub kind: TaskKind,
    pub queue: QueueName,
    pub state: TaskState,
    pub max_retries: u32,
}

/// A task claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: String,
    /// Stored type string; decoded by the dispatcher
    pub task_type: String,
    pub queue: QueueName,
    pub payload: String,
    /// Retries already consumed before this attempt
    pub retried: u32,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl ClaimedTask {
    /// True when a failure of this attempt may still be retried
    pub fn has_retries_left(&self) -> bool {
        self.retried < self.max_retries
    }
}

/// Per-queue task counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub pending: u64,
    pub active: u64,
    pub retry: u64,
    pub completed: u64,
    pub archived: u64,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, task: NewTask) -> Result<TaskInfo>;

    /// Claim the oldest ready task on a queue, if any
    async fn dequeue(&self, queue: QueueName) -> Result<Option<ClaimedTask>>;

    async fn complete(&self, id: &str) -> Result<()>;

    /// Schedule another attempt after `delay`
    async fn retry(&self, id: &str, delay: Duration, error: &str) -> Result<()>;

    /// Give up on a task
    async fn archive(&self, id: &str, error: &str) -> Result<()>;

    /// Return tasks left active by a previous process to the queue
    async fn recover_orphans(&self) -> Result<u64>;

    /// Delete finished tasks whose retention has elapsed
    async fn purge_expired(&self, now_millis: i64) -> Result<u64>;

    async fn queue_stats(&self) -> Result<Vec<QueueStats>>;
}
