//! Task kinds, queues and per-kind enqueue defaults

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The three task types handled by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    ProcessDocument,
    EnrichText,
    EnrichImage,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ProcessDocument,
        TaskKind::EnrichText,
        TaskKind::EnrichImage,
    ];

    /// Type string stored with the task
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ProcessDocument => "document:process",
            TaskKind::EnrichText => "enrich:text",
            TaskKind::EnrichImage => "enrich:image",
        }
    }

    /// True for kinds that call the AI provider
    pub fn is_ai_bound(&self) -> bool {
        matches!(self, TaskKind::EnrichText | TaskKind::EnrichImage)
    }

    pub fn default_options(&self) -> TaskOptions {
        match self {
            TaskKind::ProcessDocument => TaskOptions {
                queue: QueueName::OfflineProcessing,
                max_retries: 3,
                timeout: Duration::from_secs(5 * 60),
                retention: 7 * DAY,
            },
            TaskKind::EnrichText => TaskOptions {
                queue: QueueName::TextEnrichment,
                max_retries: 10,
                timeout: Duration::from_secs(10 * 60),
                retention: 7 * DAY,
            },
            TaskKind::EnrichImage => TaskOptions {
                queue: QueueName::ImageEnrichment,
                max_retries: 10,
                timeout: Duration::from_secs(15 * 60),
                retention: 7 * DAY,
            },
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown task type: {}", s))
    }
}

/// Named queues with their servicing weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    TextEnrichment,
    OfflineProcessing,
    ImageEnrichment,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::TextEnrichment,
        QueueName::OfflineProcessing,
        QueueName::ImageEnrichment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::TextEnrichment => "text-enrichment",
            QueueName::OfflineProcessing => "offline-processing",
            QueueName::ImageEnrichment => "image-enrichment",
        }
    }

    /// Relative weight when servicing queues proportionally
    pub fn priority(&self) -> u32 {
        match self {
            QueueName::TextEnrichment => 7,
            QueueName::OfflineProcessing => 5,
            QueueName::ImageEnrichment => 3,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| format!("unknown queue: {}", s))
    }
}

/// Broker options attached to an enqueued task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    pub queue: QueueName,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Wall-clock limit for one attempt
    pub timeout: Duration,
    /// How long a finished task is kept before purge
    pub retention: Duration,
}
