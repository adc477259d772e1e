//! Wire types for the AI provider HTTP API

use serde::{Deserialize, Serialize};

/// A source or citation found in the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    /// e.g. "study", "article", "quote"
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TextRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContextCleanRequest<'a> {
    pub text: &'a str,
    pub offline_template: &'a str,
    pub original_markup: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReferencesResponse {
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// Quality verdict as returned by the provider; invariants are re-derived locally
#[derive(Debug, Deserialize)]
pub(crate) struct QualityResponse {
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub quality_indicators: Vec<String>,
    #[serde(default)]
    pub problems_detected: Vec<String>,
}
