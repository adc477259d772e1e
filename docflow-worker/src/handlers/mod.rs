//! Task handlers
//!
//! [`TaskRouter`] maps each decoded payload variant onto its handler. The
//! match is exhaustive, so a new task kind cannot be added without a handler.

pub mod enrich_image;
pub mod enrich_text;
pub mod process_document;

use std::sync::Arc;

use docflow_common::time;
use tokio_util::sync::CancellationToken;

use crate::error::TaskResult;
use crate::metrics::MetricsSink;
use crate::tasks::{TaskKind, TaskPayload, TraceFields};
use crate::trace::{self, SpanContext};

pub use enrich_image::{image_metadata, EnrichImageHandler};
pub use enrich_text::EnrichTextHandler;
pub use process_document::{should_enrich, ProcessDocumentHandler, ENRICHMENT_GATE};

/// Routing table from payload kind to handler
pub struct TaskRouter {
    pub process_document: ProcessDocumentHandler,
    pub enrich_text: EnrichTextHandler,
    pub enrich_image: EnrichImageHandler,
}

impl TaskRouter {
    /// Run the handler for one decoded task
    ///
    /// # Arguments
    /// * `task_id` - Broker task id, recorded on the task span
    /// * `payload` - Decoded task body
    /// * `cancel` - Fires when the worker is abandoning in-flight tasks
    pub async fn route(
        &self,
        task_id: &str,
        payload: TaskPayload,
        cancel: &CancellationToken,
    ) -> TaskResult<()> {
        match payload {
            TaskPayload::ProcessDocument(p) => self.process_document.handle(task_id, p).await,
            TaskPayload::EnrichText(p) => self.enrich_text.handle(task_id, p, cancel).await,
            TaskPayload::EnrichImage(p) => self.enrich_image.handle(task_id, p, cancel).await,
        }
    }
}

/// Open the consumer span for a task and record how long it waited
///
/// Continues the producer's trace when the payload carries one.
pub(crate) fn begin_task(
    kind: TaskKind,
    task_id: &str,
    fields: &TraceFields,
    metrics: &Arc<dyn MetricsSink>,
) -> (tracing::Span, SpanContext) {
    let parent = trace::extract(fields);
    let (span, ctx) = trace::task_span(kind.as_str(), task_id, parent.as_ref());

    if let Some(wait) = trace::queue_wait(fields.enqueued_at, time::now_nanos()) {
        trace::record_queue_wait(&span, wait);
        metrics.queue_wait(kind, wait);
    }

    (span, ctx)
}
