//! Stage 1: offline document processing
//!
//! Analyzes the document without any external call, persists the record and
//! decides whether the document is worth AI enrichment. Success depends only
//! on analysis and persistence; follow-on enqueue failures are logged.

use std::sync::Arc;

use tracing::Instrument;

use crate::analyzer::{DocumentAnalyzer, OfflineAnalysis};
use crate::error::TaskResult;
use crate::metrics::MetricsSink;
use crate::models::AnalysisRecord;
use crate::queue::TaskClient;
use crate::store::AnalysisStore;
use crate::tasks::{
    EnrichImagePayload, EnrichTextPayload, ProcessDocumentPayload, TaskKind, TaskPayload,
    TraceFields,
};
use crate::trace::SpanContext;

use super::begin_task;

/// Minimum quality score for Stage 2 enrichment
pub const ENRICHMENT_GATE: f64 = 0.35;

/// Enrichment gate: inclusive at exactly [`ENRICHMENT_GATE`]
pub fn should_enrich(score: f64) -> bool {
    score >= ENRICHMENT_GATE
}

pub struct ProcessDocumentHandler {
    analyzer: Arc<dyn DocumentAnalyzer>,
    store: Arc<dyn AnalysisStore>,
    client: TaskClient,
    metrics: Arc<dyn MetricsSink>,
}

impl ProcessDocumentHandler {
    pub fn new(
        analyzer: Arc<dyn DocumentAnalyzer>,
        store: Arc<dyn AnalysisStore>,
        client: TaskClient,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            analyzer,
            store,
            client,
            metrics,
        }
    }

    pub async fn handle(&self, task_id: &str, payload: ProcessDocumentPayload) -> TaskResult<()> {
        let (span, ctx) = begin_task(
            TaskKind::ProcessDocument,
            task_id,
            &payload.trace,
            &self.metrics,
        );
        self.process(payload, ctx).instrument(span).await
    }

    async fn process(&self, payload: ProcessDocumentPayload, ctx: SpanContext) -> TaskResult<()> {
        let analysis_id = payload.analysis_id;
        let analysis = self.analyzer.analyze(&payload.text);
        let score = analysis.quality.score;

        let record = build_record(analysis_id, &analysis);
        self.store.save_analysis(&record).await?;

        tracing::info!(
            analysis_id = %analysis_id,
            words = analysis.statistics.word_count,
            quality = score,
            categories = ?analysis.quality.categories,
            "Offline analysis saved"
        );

        let passed = should_enrich(score);
        self.metrics.gate_decision(passed, score);
        if !passed {
            tracing::info!(
                analysis_id = %analysis_id,
                quality = score,
                gate = ENRICHMENT_GATE,
                "Quality below enrichment gate, skipping AI enrichment"
            );
            return Ok(());
        }

        self.enqueue_follow_ons(payload, analysis.cleaned_text, &ctx)
            .await;
        Ok(())
    }

    /// Enqueue text enrichment plus one image task per URL
    ///
    /// Each enqueue stands alone; a failure is logged and the rest continue.
    async fn enqueue_follow_ons(
        &self,
        payload: ProcessDocumentPayload,
        cleaned_text: String,
        ctx: &SpanContext,
    ) {
        let analysis_id = payload.analysis_id;

        let text_task = TaskPayload::EnrichText(EnrichTextPayload {
            analysis_id,
            text: payload.text,
            offline_cleaned_text: Some(cleaned_text).filter(|t| !t.trim().is_empty()),
            original_markup: payload.original_markup.filter(|m| !m.is_empty()),
            trace: TraceFields::default(),
        });
        self.enqueue_one(text_task, ctx).await;

        for image_url in payload.images {
            let image_task = TaskPayload::EnrichImage(EnrichImagePayload {
                analysis_id,
                image_url,
                trace: TraceFields::default(),
            });
            self.enqueue_one(image_task, ctx).await;
        }
    }

    async fn enqueue_one(&self, task: TaskPayload, ctx: &SpanContext) {
        let kind = task.kind();
        let analysis_id = task.analysis_id();
        match self.client.enqueue(task, Some(ctx)).await {
            Ok(info) => {
                self.metrics.follow_on_enqueue(kind, true);
                tracing::debug!(
                    analysis_id = %analysis_id,
                    task_type = kind.as_str(),
                    follow_on_id = %info.id,
                    "Follow-on task enqueued"
                );
            }
            Err(e) => {
                self.metrics.follow_on_enqueue(kind, false);
                tracing::warn!(
                    analysis_id = %analysis_id,
                    task_type = kind.as_str(),
                    error = %e,
                    "Failed to enqueue follow-on task"
                );
            }
        }
    }
}

fn build_record(analysis_id: uuid::Uuid, analysis: &OfflineAnalysis) -> AnalysisRecord {
    let mut record = AnalysisRecord::new(analysis_id);
    record.statistics = analysis.statistics.clone();
    record.sentiment = Some(analysis.sentiment.clone());
    record.readability = Some(analysis.readability.clone());
    record.quality_score = Some(analysis.quality.clone());
    record.cleaned_text = Some(analysis.cleaned_text.clone());
    record
}
