//! Task payloads
//!
//! Each task kind has a flat JSON payload. Trace fields are flattened into
//! the same object and default to empty/zero, so payloads from producers
//! that do not trace decode without error.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::options::TaskKind;
use crate::error::TaskError;

/// Trace context and enqueue timestamp carried by every payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFields {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    /// Nanoseconds since the Unix epoch; 0 when unknown
    #[serde(default)]
    pub enqueued_at: i64,
}

/// Stage 1 input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDocumentPayload {
    pub analysis_id: Uuid,
    pub text: String,
    /// gzip + base64 encoded markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_markup: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub trace: TraceFields,
}

/// Stage 2 text input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichTextPayload {
    pub analysis_id: Uuid,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_cleaned_text: Option<String>,
    /// gzip + base64 encoded markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_markup: Option<String>,
    #[serde(flatten)]
    pub trace: TraceFields,
}

/// Stage 2 image input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichImagePayload {
    pub analysis_id: Uuid,
    pub image_url: String,
    #[serde(flatten)]
    pub trace: TraceFields,
}

/// A decoded task body
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    ProcessDocument(ProcessDocumentPayload),
    EnrichText(EnrichTextPayload),
    EnrichImage(EnrichImagePayload),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::ProcessDocument(_) => TaskKind::ProcessDocument,
            TaskPayload::EnrichText(_) => TaskKind::EnrichText,
            TaskPayload::EnrichImage(_) => TaskKind::EnrichImage,
        }
    }

    pub fn analysis_id(&self) -> Uuid {
        match self {
            TaskPayload::ProcessDocument(p) => p.analysis_id,
            TaskPayload::EnrichText(p) => p.analysis_id,
            TaskPayload::EnrichImage(p) => p.analysis_id,
        }
    }

    pub fn trace(&self) -> &TraceFields {
        match self {
            TaskPayload::ProcessDocument(p) => &p.trace,
            TaskPayload::EnrichText(p) => &p.trace,
            TaskPayload::EnrichImage(p) => &p.trace,
        }
    }

    pub fn trace_mut(&mut self) -> &mut TraceFields {
        match self {
            TaskPayload::ProcessDocument(p) => &mut p.trace,
            TaskPayload::EnrichText(p) => &mut p.trace,
            TaskPayload::EnrichImage(p) => &mut p.trace,
        }
    }

    /// Serialize the body (without the type discriminator)
    pub fn to_json(&self) -> Result<String, TaskError> {
        let json = match self {
            TaskPayload::ProcessDocument(p) => serde_json::to_string(p),
            TaskPayload::EnrichText(p) => serde_json::to_string(p),
            TaskPayload::EnrichImage(p) => serde_json::to_string(p),
        };
        json.map_err(|e| TaskError::Payload(format!("Serialize payload failed: {}", e)))
    }

    /// Decode a body stored under the given type string
    pub fn decode(task_type: &str, body: &str) -> Result<Self, TaskError> {
        let kind: TaskKind = task_type.parse().map_err(TaskError::Payload)?;
        let invalid = |e: serde_json::Error| {
            TaskError::Payload(format!("Malformed {} payload: {}", task_type, e))
        };

        Ok(match kind {
            TaskKind::ProcessDocument => {
                TaskPayload::ProcessDocument(serde_json::from_str(body).map_err(invalid)?)
            }
            TaskKind::EnrichText => {
                TaskPayload::EnrichText(serde_json::from_str(body).map_err(invalid)?)
            }
            TaskKind::EnrichImage => {
                TaskPayload::EnrichImage(serde_json::from_str(body).map_err(invalid)?)
            }
        })
    }
}
