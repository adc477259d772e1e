//! Distributed trace propagation across the task queue
//!
//! Producers copy the current span context into the payload's trace fields
//! ([`inject`]); the worker rebuilds it on dequeue ([`extract`]) and opens a
//! child span for the task, so one trace covers the request that created a
//! document and every task it fans out into. Ids use the W3C trace-context
//! widths: a 128-bit trace id and a 64-bit span id, hex encoded.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::field;

use crate::tasks::TraceFields;

/// 128-bit trace identifier; zero is invalid
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

/// 64-bit span identifier; zero is invalid
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl TraceId {
    pub const INVALID: TraceId = TraceId(0);

    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Parse 32 lowercase or uppercase hex characters
    pub fn from_hex(hex: &str) -> Option<Self> {
        parse_hex(hex, 32)
            .and_then(|_| u128::from_str_radix(hex, 16).ok())
            .map(Self)
            .filter(|id| id.is_valid())
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id = Self(rng.gen());
            if id.is_valid() {
                return id;
            }
        }
    }
}

impl SpanId {
    pub const INVALID: SpanId = SpanId(0);

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Parse 16 lowercase or uppercase hex characters
    pub fn from_hex(hex: &str) -> Option<Self> {
        parse_hex(hex, 16)
            .and_then(|_| u64::from_str_radix(hex, 16).ok())
            .map(Self)
            .filter(|id| id.is_valid())
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id = Self(rng.gen());
            if id.is_valid() {
                return id;
            }
        }
    }
}

fn parse_hex(hex: &str, width: usize) -> Option<()> {
    (hex.len() == width && hex.bytes().all(|b| b.is_ascii_hexdigit())).then_some(())
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

/// Identity of one span within a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub sampled: bool,
    /// True when reconstructed from a payload rather than created locally
    pub is_remote: bool,
}

impl SpanContext {
    /// Start a new trace
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            sampled: true,
            is_remote: false,
        }
    }

    /// New span in the same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            sampled: self.sampled,
            is_remote: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// Copy the span context into payload trace fields
///
/// Leaves the fields untouched when there is no valid context.
pub fn inject(fields: &mut TraceFields, ctx: Option<&SpanContext>) {
    if let Some(ctx) = ctx.filter(|c| c.is_valid()) {
        fields.trace_id = ctx.trace_id.to_string();
        fields.span_id = ctx.span_id.to_string();
    }
}

/// Rebuild the producer's span context from payload trace fields
///
/// Empty or malformed ids yield `None`; untraced producers are not an error.
pub fn extract(fields: &TraceFields) -> Option<SpanContext> {
    let trace_id = TraceId::from_hex(fields.trace_id.trim())?;
    let span_id = SpanId::from_hex(fields.span_id.trim())?;
    Some(SpanContext {
        trace_id,
        span_id,
        sampled: true,
        is_remote: true,
    })
}

/// Time a task spent waiting in the queue
///
/// Returns `None` when the producer did not stamp an enqueue time. Clock skew
/// that would make the wait negative saturates to zero.
pub fn queue_wait(enqueued_at_nanos: i64, now_nanos: i64) -> Option<Duration> {
    if enqueued_at_nanos <= 0 {
        return None;
    }
    Some(docflow_common::time::elapsed_between_nanos(
        enqueued_at_nanos,
        now_nanos,
    ))
}

/// Span for the producer side of an enqueue
pub fn producer_span(task_type: &str, ctx: &SpanContext) -> tracing::Span {
    tracing::info_span!(
        "enqueue",
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        task_type = task_type,
    )
}

/// Consumer span for one task execution
///
/// Continues the payload's trace when present, otherwise starts a new one.
/// `queue_wait_ms` is left empty for [`record_queue_wait`].
pub fn task_span(
    task_type: &str,
    task_id: &str,
    parent: Option<&SpanContext>,
) -> (tracing::Span, SpanContext) {
    let ctx = parent.map(SpanContext::child).unwrap_or_else(SpanContext::new_root);
    let parent_span_id = parent.map(|p| p.span_id.to_string());

    let span = tracing::info_span!(
        "task",
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        parent_span_id = parent_span_id.as_deref().unwrap_or(""),
        task_type = task_type,
        task_id = task_id,
        queue_wait_ms = field::Empty,
    );
    (span, ctx)
}

pub fn record_queue_wait(span: &tracing::Span, wait: Duration) {
    span.record("queue_wait_ms", wait.as_millis() as u64);
}
