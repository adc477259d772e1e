//! Stage 2: image enrichment
//!
//! There is no vision pathway, so the handler records what can be derived
//! from the URL alone and merges it into the record's image list.

use std::sync::Arc;

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{TaskError, TaskResult};
use crate::metrics::MetricsSink;
use crate::models::ImageMetadata;
use crate::store::AnalysisStore;
use crate::tasks::{EnrichImagePayload, TaskKind};

use super::begin_task;

const KNOWN_FORMATS: &[&str] = &["jpeg", "png", "gif", "webp", "svg", "avif", "bmp"];

pub struct EnrichImageHandler {
    store: Arc<dyn AnalysisStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl EnrichImageHandler {
    pub fn new(store: Arc<dyn AnalysisStore>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { store, metrics }
    }

    pub async fn handle(
        &self,
        task_id: &str,
        payload: EnrichImagePayload,
        cancel: &CancellationToken,
    ) -> TaskResult<()> {
        let (span, _ctx) = begin_task(TaskKind::EnrichImage, task_id, &payload.trace, &self.metrics);
        self.enrich(payload, cancel).instrument(span).await
    }

    async fn enrich(&self, payload: EnrichImagePayload, cancel: &CancellationToken) -> TaskResult<()> {
        let image = image_metadata(&payload.image_url)?;

        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        self.store.merge_image(payload.analysis_id, &image).await?;
        tracing::info!(
            analysis_id = %payload.analysis_id,
            host = %image.host,
            format = %image.format,
            "Image metadata merged"
        );
        Ok(())
    }
}

/// Derive image metadata from its URL
///
/// URLs without a scheme or host are payload errors.
pub fn image_metadata(url: &str) -> TaskResult<ImageMetadata> {
    let url = url.trim();
    let parsed = Url::parse(url)
        .map_err(|e| TaskError::Payload(format!("invalid image URL {:?}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TaskError::Payload(format!("image URL has no host: {:?}", url)))?
        .to_string();

    let file_name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(ImageMetadata {
        url: url.to_string(),
        host,
        format: image_format(file_name.as_deref()).to_string(),
        file_name,
        analyzed_at: docflow_common::time::now(),
    })
}

fn image_format(file_name: Option<&str>) -> &'static str {
    let extension = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "jpeg",
        Some(ext) => KNOWN_FORMATS
            .iter()
            .find(|known| **known == ext)
            .copied()
            .unwrap_or("unknown"),
        None => "unknown",
    }
}
