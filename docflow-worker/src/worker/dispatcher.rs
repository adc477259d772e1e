//! Worker dispatcher
//!
//! Pulls tasks from the broker and runs them with bounded concurrency.
//! Queues are polled in a weighted random order on every claim, so higher
//! priority queues are serviced more often without starving the others.
//!
//! Failure handling per attempt:
//! - undecodable payload: archived immediately
//! - retriable error with retries left: rescheduled per [`retry_delay`]
//! - handler panic: archived as a permanent failure
//! - anything else: archived
//!
//! Shutdown stops new claims, then waits up to the configured timeout for
//! in-flight tasks before cancelling them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docflow_common::{time, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::config::WorkerConfig;
use super::retry::retry_delay;
use crate::error::TaskError;
use crate::handlers::TaskRouter;
use crate::metrics::{MetricsSink, TaskOutcome};
use crate::queue::{Broker, ClaimedTask};
use crate::tasks::{QueueName, TaskKind, TaskPayload};

/// Extra time given to cancelled tasks to unwind after the shutdown timeout
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// State shared by every task execution
struct Shared {
    broker: Arc<dyn Broker>,
    router: TaskRouter,
    metrics: Arc<dyn MetricsSink>,
}

pub struct Dispatcher {
    shared: Arc<Shared>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn Broker>,
        router: TaskRouter,
        metrics: Arc<dyn MetricsSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                broker,
                router,
                metrics,
            }),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`Dispatcher::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a graceful drain
    pub fn shutdown(&self) {
        tracing::info!("Dispatcher shutdown requested");
        self.shutdown.cancel();
    }

    /// Run until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let abort = CancellationToken::new();
        let mut in_flight: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();
        let mut rng = StdRng::from_entropy();
        let mut next_purge = Instant::now();

        tracing::info!(
            concurrency = self.config.concurrency,
            queues = ?self.config.queues,
            "Dispatcher started"
        );

        loop {
            while let Some(Some(joined)) = in_flight.next().now_or_never() {
                log_join(joined);
            }

            if Instant::now() >= next_purge {
                self.purge_expired().await;
                next_purge = Instant::now() + self.config.purge_interval;
            }

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = match self.claim_next(&mut rng).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dequeue task");
                    None
                }
            };

            match claimed {
                Some(task) => {
                    let shared = Arc::clone(&self.shared);
                    let cancel = abort.child_token();
                    in_flight.push(tokio::spawn(async move {
                        let _permit = permit;
                        shared.execute(task, &cancel).await;
                    }));
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(
            in_flight = in_flight.len(),
            timeout_secs = self.config.shutdown_timeout.as_secs(),
            "Draining in-flight tasks"
        );

        if tokio::time::timeout(self.config.shutdown_timeout, drain(&mut in_flight))
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = in_flight.len(),
                "Shutdown timeout elapsed, cancelling in-flight tasks"
            );
            abort.cancel();

            if tokio::time::timeout(CANCEL_GRACE, drain(&mut in_flight))
                .await
                .is_err()
            {
                for handle in in_flight.iter() {
                    handle.abort();
                }
                tracing::warn!(
                    remaining = in_flight.len(),
                    "Abandoned tasks will be recovered on next start"
                );
            }
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    /// Claim and run a single task inline
    ///
    /// Returns `false` when every queue was empty.
    pub async fn process_next(&self) -> Result<bool> {
        let mut rng = StdRng::from_entropy();
        match self.claim_next(&mut rng).await? {
            Some(task) => {
                self.shared.execute(task, &CancellationToken::new()).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_next(&self, rng: &mut StdRng) -> Result<Option<ClaimedTask>> {
        for queue in weighted_queue_order(&self.config.queues, rng) {
            if let Some(task) = self.shared.broker.dequeue(queue).await? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    async fn purge_expired(&self) {
        match self.shared.broker.purge_expired(time::now_millis()).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Purged expired tasks"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired tasks"),
        }
    }
}

impl Shared {
    async fn execute(&self, task: ClaimedTask, cancel: &CancellationToken) {
        let started = Instant::now();

        let payload = match TaskPayload::decode(&task.task_type, &task.payload) {
            Ok(payload) => payload,
            Err(e) => {
                report_failure(&task, &e, "payload rejected");
                self.archive(&task, &e.to_string()).await;
                if let Ok(kind) = task.task_type.parse::<TaskKind>() {
                    self.metrics
                        .task_finished(kind, TaskOutcome::Archived, started.elapsed());
                }
                return;
            }
        };

        let kind = payload.kind();
        self.metrics.task_started(kind);

        let run = AssertUnwindSafe(self.router.route(&task.id, payload, cancel)).catch_unwind();
        let result = match tokio::time::timeout(task.timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(TaskError::Permanent(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(TaskError::Transient(format!(
                "deadline exceeded after {}s",
                task.timeout.as_secs()
            ))),
        };

        let outcome = match result {
            Ok(()) => {
                if let Err(e) = self.broker.complete(&task.id).await {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to mark task completed");
                }
                tracing::debug!(
                    task_id = %task.id,
                    task_type = kind.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Task completed"
                );
                TaskOutcome::Succeeded
            }
            Err(err) => self.fail(&task, kind, err).await,
        };

        self.metrics.task_finished(kind, outcome, started.elapsed());
    }

    async fn fail(&self, task: &ClaimedTask, kind: TaskKind, err: TaskError) -> TaskOutcome {
        let message = err.to_string();

        if err.is_retriable() && task.has_retries_left() {
            let delay = retry_delay(kind, task.retried);
            tracing::warn!(
                task_id = %task.id,
                task_type = kind.as_str(),
                attempt = task.retried + 1,
                max_retries = task.max_retries,
                retry_in_secs = delay.as_secs(),
                error = %message,
                "Task failed, scheduling retry"
            );
            if let Err(e) = self.broker.retry(&task.id, delay, &message).await {
                tracing::error!(task_id = %task.id, error = %e, "Failed to schedule retry");
            }
            return TaskOutcome::Retried;
        }

        let reason = if err.is_retriable() {
            "retries exhausted"
        } else {
            "permanent failure"
        };
        report_failure(task, &err, reason);
        self.archive(task, &message).await;
        TaskOutcome::Archived
    }

    async fn archive(&self, task: &ClaimedTask, message: &str) {
        if let Err(e) = self.broker.archive(&task.id, message).await {
            tracing::error!(task_id = %task.id, error = %e, "Failed to archive task");
        }
    }
}

/// Error handler for attempts that will not be retried
fn report_failure(task: &ClaimedTask, err: &TaskError, reason: &str) {
    tracing::error!(
        task_id = %task.id,
        task_type = %task.task_type,
        queue = task.queue.as_str(),
        retried = task.retried,
        max_retries = task.max_retries,
        reason,
        error = %err,
        "Task archived"
    );
}

async fn drain(in_flight: &mut FuturesUnordered<JoinHandle<()>>) {
    while let Some(joined) = in_flight.next().await {
        log_join(joined);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Task execution panicked");
        }
    }
}

/// Queue polling order for one claim
///
/// Weighted sampling without replacement: each queue's chance of being
/// polled first is proportional to its weight. Zero-weight queues go last.
pub fn weighted_queue_order<R: Rng>(
    queues: &[(QueueName, u32)],
    rng: &mut R,
) -> Vec<QueueName> {
    let mut remaining: Vec<(QueueName, u32)> =
        queues.iter().copied().filter(|(_, w)| *w > 0).collect();
    let mut order = Vec::with_capacity(queues.len());

    while !remaining.is_empty() {
        let total: u32 = remaining.iter().map(|(_, w)| *w).sum();
        let mut pick = rng.gen_range(0..total);
        let index = remaining
            .iter()
            .position(|(_, w)| {
                if pick < *w {
                    true
                } else {
                    pick -= *w;
                    false
                }
            })
            .unwrap_or(0);
        order.push(remaining.remove(index).0);
    }

    order.extend(queues.iter().filter(|(_, w)| *w == 0).map(|(q, _)| *q));
    order
}
