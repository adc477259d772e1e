//! AI provider collaborator
//!
//! Stage 2 talks to the language-model service through [`AiProvider`]. Each
//! operation may fail on its own; callers decide whether a failure aborts the
//! enrichment or falls back to a rule-based equivalent.

pub mod http;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::TaskError;
use crate::models::{AiDetection, EditorialAnalysis, Synopsis, TextQualityScore};
use crate::quality::score_text_quality_fallback;

pub use http::{AiClientConfig, HttpAiProvider};
pub use types::Reference;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI provider network error: {0}")]
    Network(String),

    #[error("AI provider request timed out")]
    Timeout,

    #[error("AI provider returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Failed to parse AI provider response: {0}")]
    Parse(String),

    #[error("AI provider call cancelled")]
    Cancelled,
}

impl AiError {
    /// Network failures, timeouts, 429 and 5xx are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Network(_) | AiError::Timeout => true,
            AiError::Status(code, _) => *code == 429 || (500..600).contains(code),
            AiError::Parse(_) | AiError::Cancelled => false,
        }
    }
}

impl From<AiError> for TaskError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Cancelled => TaskError::Cancelled,
            e if e.is_transient() => TaskError::Transient(e.to_string()),
            e => TaskError::Permanent(e.to_string()),
        }
    }
}

pub type AiResult<T> = std::result::Result<T, AiError>;

/// Language-model operations used by enrichment
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate_synopsis(&self, text: &str) -> AiResult<Synopsis>;

    async fn clean_text(&self, text: &str) -> AiResult<String>;

    /// Clean text using the offline-cleaned version as a template and the
    /// decoded original markup as structural context
    async fn clean_text_with_context(
        &self,
        text: &str,
        offline_template: &str,
        original_markup: &str,
    ) -> AiResult<String>;

    async fn editorial_analysis(&self, text: &str) -> AiResult<EditorialAnalysis>;

    async fn generate_tags(&self, text: &str) -> AiResult<Vec<String>>;

    async fn extract_references(&self, text: &str) -> AiResult<Vec<Reference>>;

    async fn detect_ai_content(&self, text: &str) -> AiResult<AiDetection>;

    async fn score_text_quality(&self, text: &str) -> AiResult<TextQualityScore>;
}

/// Ask the provider for a quality score, falling back to the rule-based scorer
///
/// # Arguments
/// * `provider` - AI provider
/// * `text` - Document text
/// * `word_count` - Word count for the fallback scorer
/// * `readability_score` - Flesch reading ease for the fallback scorer
pub async fn score_quality_or_fallback(
    provider: &dyn AiProvider,
    text: &str,
    word_count: usize,
    readability_score: f64,
) -> TextQualityScore {
    match provider.score_text_quality(text).await {
        Ok(score) => {
            let mut score = score.normalized();
            score.ai_used = true;
            score
        }
        Err(e) => {
            tracing::warn!(error = %e, "AI quality scoring failed, using rule-based score");
            score_text_quality_fallback(text, word_count, readability_score)
        }
    }
}
