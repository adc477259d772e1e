//! Stage 2: AI text enrichment
//!
//! Loads the Stage 1 record, asks the provider for synopsis, cleaned text,
//! editorial analysis, AI-content detection and tags, and merges whatever
//! succeeded into the record. Individual provider failures leave their field
//! untouched. The task fails only when every call failed, or when the
//! enrichment cannot be written.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::ai::{AiError, AiProvider, AiResult};
use crate::error::{TaskError, TaskResult};
use crate::metrics::MetricsSink;
use crate::models::{AiDetection, EditorialAnalysis, EnrichmentPatch, Synopsis};
use crate::store::AnalysisStore;
use crate::tasks::{decode_markup, EnrichTextPayload, TaskKind};

use super::begin_task;

/// Offline template plus decoded markup for context-aware cleaning
struct CleaningContext {
    template: String,
    markup: String,
}

struct ProviderResults {
    synopsis: AiResult<Synopsis>,
    cleaned_text: AiResult<String>,
    editorial: AiResult<EditorialAnalysis>,
    ai_detection: AiResult<AiDetection>,
    tags: AiResult<Vec<String>>,
}

const PROVIDER_CALLS: usize = 5;

pub struct EnrichTextHandler {
    store: Arc<dyn AnalysisStore>,
    ai: Arc<dyn AiProvider>,
    metrics: Arc<dyn MetricsSink>,
}

impl EnrichTextHandler {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        ai: Arc<dyn AiProvider>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self { store, ai, metrics }
    }

    pub async fn handle(
        &self,
        task_id: &str,
        payload: EnrichTextPayload,
        cancel: &CancellationToken,
    ) -> TaskResult<()> {
        let (span, _ctx) = begin_task(TaskKind::EnrichText, task_id, &payload.trace, &self.metrics);
        self.enrich(payload, cancel).instrument(span).await
    }

    async fn enrich(&self, payload: EnrichTextPayload, cancel: &CancellationToken) -> TaskResult<()> {
        let analysis_id = payload.analysis_id;
        let context = cleaning_context(&payload)?;

        // A missing record fails before any provider call is spent on it
        self.store.get_analysis(analysis_id).await?;

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(analysis_id = %analysis_id, "Enrichment cancelled before provider calls finished");
                return Err(TaskError::Cancelled);
            }
            results = self.call_provider(&payload.text, context.as_ref()) => results,
        };

        let patch = build_patch(analysis_id, results)?;

        // Nothing may be written once cancellation has been observed
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let tags_replaced = !patch.tags.is_empty();

        if let Err(e) = self.store.apply_enrichment(analysis_id, &patch).await {
            let err = TaskError::from(e);
            tracing::error!(
                analysis_id = %analysis_id,
                error = %err,
                retriable = err.is_retriable(),
                "Failed to save enriched analysis"
            );
            return Err(err);
        }

        tracing::info!(
            analysis_id = %analysis_id,
            context_cleaning = context.is_some(),
            tags_replaced,
            "Text enrichment saved"
        );
        Ok(())
    }

    async fn call_provider(&self, text: &str, context: Option<&CleaningContext>) -> ProviderResults {
        let ai = self.ai.as_ref();
        let cleaned_text = async {
            match context {
                Some(ctx) => ai.clean_text_with_context(text, &ctx.template, &ctx.markup).await,
                None => ai.clean_text(text).await,
            }
        };

        let (synopsis, cleaned_text, editorial, ai_detection, tags) = tokio::join!(
            ai.generate_synopsis(text),
            cleaned_text,
            ai.editorial_analysis(text),
            ai.detect_ai_content(text),
            ai.generate_tags(text),
        );

        ProviderResults {
            synopsis,
            cleaned_text,
            editorial,
            ai_detection,
            tags,
        }
    }
}

/// Context-aware cleaning needs both the offline template and the markup
fn cleaning_context(payload: &EnrichTextPayload) -> TaskResult<Option<CleaningContext>> {
    let template = payload
        .offline_cleaned_text
        .as_deref()
        .filter(|t| !t.trim().is_empty());
    let markup = payload.original_markup.as_deref().filter(|m| !m.is_empty());

    match (template, markup) {
        (Some(template), Some(markup)) => {
            let markup = decode_markup(markup)
                .map_err(|e| TaskError::Payload(format!("original_markup: {}", e)))?;
            Ok(Some(CleaningContext {
                template: template.to_string(),
                markup,
            }))
        }
        _ => Ok(None),
    }
}

/// Collect successful results into a patch
///
/// Returns an error only when every provider call failed; a transient
/// failure is preferred so the task is retried.
fn build_patch(analysis_id: Uuid, results: ProviderResults) -> TaskResult<EnrichmentPatch> {
    let mut patch = EnrichmentPatch::default();
    let mut failures: Vec<(&'static str, AiError)> = Vec::new();

    match results.synopsis {
        Ok(synopsis) => patch.synopsis = Some(synopsis),
        Err(e) => failures.push(("synopsis", e)),
    }
    match results.cleaned_text {
        Ok(text) if !text.trim().is_empty() => patch.cleaned_text = Some(text),
        Ok(_) => {}
        Err(e) => failures.push(("clean_text", e)),
    }
    match results.editorial {
        Ok(editorial) => patch.editorial = Some(editorial),
        Err(e) => failures.push(("editorial_analysis", e)),
    }
    match results.ai_detection {
        Ok(detection) => patch.ai_detection = Some(detection),
        Err(e) => failures.push(("detect_ai_content", e)),
    }
    match results.tags {
        Ok(tags) => patch.tags = tags,
        Err(e) => failures.push(("generate_tags", e)),
    }

    for (operation, error) in &failures {
        tracing::warn!(
            analysis_id = %analysis_id,
            operation,
            error = %error,
            transient = error.is_transient(),
            "AI enrichment step failed"
        );
    }

    if failures.len() == PROVIDER_CALLS {
        let pick = failures
            .iter()
            .position(|(_, e)| e.is_transient())
            .unwrap_or(0);
        let (_, error) = failures.swap_remove(pick);
        return Err(TaskError::from(error));
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{encode_markup, TraceFields};

    fn payload(template: Option<&str>, markup: Option<String>) -> EnrichTextPayload {
        EnrichTextPayload {
            analysis_id: Uuid::new_v4(),
            text: "Body".to_string(),
            offline_cleaned_text: template.map(str::to_string),
            original_markup: markup,
            trace: TraceFields::default(),
        }
    }

    fn all_failed(error: fn() -> AiError) -> ProviderResults {
        ProviderResults {
            synopsis: Err(error()),
            cleaned_text: Err(error()),
            editorial: Err(error()),
            ai_detection: Err(error()),
            tags: Err(error()),
        }
    }

    #[test]
    fn test_context_requires_template_and_markup() {
        let markup = encode_markup("<p>Body</p>").unwrap();
        assert!(cleaning_context(&payload(None, Some(markup.clone()))).unwrap().is_none());
        assert!(cleaning_context(&payload(Some("Body"), None)).unwrap().is_none());
        assert!(cleaning_context(&payload(Some("  "), Some(markup.clone()))).unwrap().is_none());

        let ctx = cleaning_context(&payload(Some("Body"), Some(markup))).unwrap().unwrap();
        assert_eq!(ctx.markup, "<p>Body</p>");
        assert_eq!(ctx.template, "Body");
    }

    #[test]
    fn test_corrupt_markup_is_payload_error() {
        let err = cleaning_context(&payload(Some("Body"), Some("%%not-base64%%".to_string())))
            .err()
            .unwrap();
        assert!(matches!(err, TaskError::Payload(_)));
    }

    #[test]
    fn test_partial_failure_keeps_successes() {
        let results = ProviderResults {
            synopsis: Ok(Synopsis {
                summary: "Short".to_string(),
                key_points: vec![],
            }),
            cleaned_text: Err(AiError::Timeout),
            editorial: Err(AiError::Parse("bad".into())),
            ai_detection: Err(AiError::Timeout),
            tags: Ok(vec![]),
        };
        let patch = build_patch(Uuid::new_v4(), results).unwrap();
        assert!(patch.synopsis.is_some());
        assert!(patch.cleaned_text.is_none());
        assert!(patch.tags.is_empty());
    }

    #[test]
    fn test_total_failure_prefers_transient() {
        let results = ProviderResults {
            synopsis: Err(AiError::Status(400, "bad".into())),
            ..all_failed(|| AiError::Timeout)
        };
        let err = build_patch(Uuid::new_v4(), results).unwrap_err();
        assert!(err.is_retriable());

        let err = build_patch(Uuid::new_v4(), all_failed(|| AiError::Status(401, "no".into())))
            .unwrap_err();
        assert!(matches!(err, TaskError::Permanent(_)));
    }
}
