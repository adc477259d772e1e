//! Producer-side task client
//!
//! A thin shim over the broker: stamps the enqueue time, copies the caller's
//! trace context into the payload and applies the per-kind options. Broker
//! errors are returned unchanged.

use std::sync::Arc;

use docflow_common::{time, Error, Result};

use super::broker::{Broker, NewTask, TaskInfo};
use crate::tasks::{TaskOptions, TaskPayload};
use crate::trace::{self, SpanContext};

#[derive(Clone)]
pub struct TaskClient {
    broker: Arc<dyn Broker>,
}

impl TaskClient {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Enqueue a task with its kind's default options
    ///
    /// # Arguments
    /// * `payload` - Task body; its variant selects the task type
    /// * `ctx` - Caller's span context, propagated when valid
    pub async fn enqueue(
        &self,
        payload: TaskPayload,
        ctx: Option<&SpanContext>,
    ) -> Result<TaskInfo> {
        let options = payload.kind().default_options();
        self.enqueue_with_options(payload, options, ctx).await
    }

    /// Enqueue a task with explicit broker options
    pub async fn enqueue_with_options(
        &self,
        mut payload: TaskPayload,
        options: TaskOptions,
        ctx: Option<&SpanContext>,
    ) -> Result<TaskInfo> {
        let kind = payload.kind();

        let fields = payload.trace_mut();
        fields.enqueued_at = time::now_nanos();
        trace::inject(fields, ctx);

        let body = payload
            .to_json()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        if let Some(ctx) = ctx.filter(|c| c.is_valid()) {
            let span = trace::producer_span(kind.as_str(), ctx);
            let _guard = span.enter();
            tracing::info!(
                analysis_id = %payload.analysis_id(),
                queue = options.queue.as_str(),
                "Task enqueued"
            );
        }

        let info = self
            .broker
            .enqueue(NewTask {
                kind,
                payload: body,
                options,
            })
            .await?;

        tracing::debug!(
            task_id = %info.id,
            task_type = kind.as_str(),
            queue = info.queue.as_str(),
            "Task handed to broker"
        );
        Ok(info)
    }
}
