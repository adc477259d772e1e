//! Resolved worker pool settings

use std::time::Duration;

use docflow_common::config::WorkerSection;

use crate::tasks::QueueName;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Maximum simultaneous task executions
    pub concurrency: usize,
    /// Sleep between polls when every queue is empty
    pub poll_interval: Duration,
    /// Grace period for in-flight tasks after shutdown is requested
    pub shutdown_timeout: Duration,
    /// How often finished tasks past retention are purged
    pub purge_interval: Duration,
    /// Queues serviced and their relative weights
    pub queues: Vec<(QueueName, u32)>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            queues: QueueName::ALL.iter().map(|q| (*q, q.priority())).collect(),
        }
    }
}

impl WorkerConfig {
    /// Apply the `[worker]` TOML section over the defaults
    pub fn from_section(section: &WorkerSection) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: section
                .concurrency
                .unwrap_or(defaults.concurrency)
                .max(1),
            poll_interval: section
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            shutdown_timeout: section
                .shutdown_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            ..defaults
        }
    }
}
