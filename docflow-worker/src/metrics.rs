//! Pipeline metrics
//!
//! The dispatcher, producer and handlers report through a [`MetricsSink`]
//! handed to them at construction. The process entry point owns the sink;
//! there is no global recorder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::tasks::TaskKind;

/// How a task attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Failed and rescheduled
    Retried,
    /// Failed terminally and archived
    Archived,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::Retried => "retried",
            TaskOutcome::Archived => "archived",
        }
    }
}

/// Metrics observer for the pipeline
pub trait MetricsSink: Send + Sync {
    fn task_started(&self, kind: TaskKind);

    fn task_finished(&self, kind: TaskKind, outcome: TaskOutcome, elapsed: Duration);

    /// Time between enqueue and the start of processing
    fn queue_wait(&self, kind: TaskKind, wait: Duration);

    /// Stage 1 enrichment gate result
    fn gate_decision(&self, passed: bool, score: f64);

    /// Result of enqueueing a follow-on task from Stage 1
    fn follow_on_enqueue(&self, kind: TaskKind, ok: bool);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn task_started(&self, _kind: TaskKind) {}
    fn task_finished(&self, _kind: TaskKind, _outcome: TaskOutcome, _elapsed: Duration) {}
    fn queue_wait(&self, _kind: TaskKind, _wait: Duration) {}
    fn gate_decision(&self, _passed: bool, _score: f64) {}
    fn follow_on_enqueue(&self, _kind: TaskKind, _ok: bool) {}
}

/// Emits each measurement as a `tracing` debug event under the `metrics` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn task_started(&self, kind: TaskKind) {
        tracing::debug!(target: "metrics", task_type = kind.as_str(), "task_started");
    }

    fn task_finished(&self, kind: TaskKind, outcome: TaskOutcome, elapsed: Duration) {
        tracing::debug!(
            target: "metrics",
            task_type = kind.as_str(),
            outcome = outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "task_finished"
        );
    }

    fn queue_wait(&self, kind: TaskKind, wait: Duration) {
        tracing::debug!(
            target: "metrics",
            task_type = kind.as_str(),
            wait_ms = wait.as_millis() as u64,
            "queue_wait"
        );
    }

    fn gate_decision(&self, passed: bool, score: f64) {
        tracing::debug!(target: "metrics", passed, score, "gate_decision");
    }

    fn follow_on_enqueue(&self, kind: TaskKind, ok: bool) {
        tracing::debug!(target: "metrics", task_type = kind.as_str(), ok, "follow_on_enqueue");
    }
}

/// Point-in-time copy of [`CounterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub archived: u64,
    pub queue_waits: u64,
    pub gate_passed: u64,
    pub gate_rejected: u64,
    pub follow_on_ok: u64,
    pub follow_on_failed: u64,
}

/// Lock-free counters, readable with [`CounterMetrics::snapshot`]
#[derive(Debug, Default)]
pub struct CounterMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    archived: AtomicU64,
    queue_waits: AtomicU64,
    gate_passed: AtomicU64,
    gate_rejected: AtomicU64,
    follow_on_ok: AtomicU64,
    follow_on_failed: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            queue_waits: self.queue_waits.load(Ordering::Relaxed),
            gate_passed: self.gate_passed.load(Ordering::Relaxed),
            gate_rejected: self.gate_rejected.load(Ordering::Relaxed),
            follow_on_ok: self.follow_on_ok.load(Ordering::Relaxed),
            follow_on_failed: self.follow_on_failed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for CounterMetrics {
    fn task_started(&self, _kind: TaskKind) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn task_finished(&self, _kind: TaskKind, outcome: TaskOutcome, _elapsed: Duration) {
        let counter = match outcome {
            TaskOutcome::Succeeded => &self.succeeded,
            TaskOutcome::Retried => &self.retried,
            TaskOutcome::Archived => &self.archived,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn queue_wait(&self, _kind: TaskKind, _wait: Duration) {
        self.queue_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn gate_decision(&self, passed: bool, _score: f64) {
        if passed {
            self.gate_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.gate_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn follow_on_enqueue(&self, _kind: TaskKind, ok: bool) {
        if ok {
            self.follow_on_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.follow_on_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_metrics_snapshot() {
        let metrics = CounterMetrics::new();
        metrics.task_started(TaskKind::ProcessDocument);
        metrics.task_finished(TaskKind::ProcessDocument, TaskOutcome::Succeeded, Duration::ZERO);
        metrics.task_finished(TaskKind::EnrichText, TaskOutcome::Retried, Duration::ZERO);
        metrics.gate_decision(true, 0.4);
        metrics.gate_decision(false, 0.2);
        metrics.follow_on_enqueue(TaskKind::EnrichImage, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.started, 1);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.retried, 1);
        assert_eq!(snapshot.archived, 0);
        assert_eq!(snapshot.gate_passed, 1);
        assert_eq!(snapshot.gate_rejected, 1);
        assert_eq!(snapshot.follow_on_failed, 1);
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<Box<dyn MetricsSink>> = vec![Box::new(NoopMetrics), Box::new(TracingMetrics)];
        for sink in &sinks {
            sink.task_started(TaskKind::EnrichText);
            sink.queue_wait(TaskKind::EnrichText, Duration::from_millis(3));
        }
    }
}
