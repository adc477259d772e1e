//! Analysis data model
//!
//! An [`AnalysisRecord`] accumulates results as a document moves through the
//! pipeline. Stage 1 writes statistics, sentiment, readability, the quality
//! score and the offline-cleaned text. Stage 2 merges AI enrichment in
//! through an [`EnrichmentPatch`] and image metadata through
//! [`merge_image`]; the store applies each to its own field set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score at or above which a document is "recommended"
pub const RECOMMENDED_THRESHOLD: f64 = 0.5;

/// Document-level quality verdict
///
/// Produced by the rule-based scorer (`ai_used = false`) or the AI provider
/// (`ai_used = true`). Construct through [`TextQualityScore::new`] so that
/// the score is clamped and `is_recommended` stays consistent with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQualityScore {
    pub score: f64,
    pub reason: String,
    pub categories: Vec<String>,
    pub is_recommended: bool,
    pub quality_indicators: Vec<String>,
    pub problems_detected: Vec<String>,
    pub ai_used: bool,
}

impl TextQualityScore {
    /// Build a score, clamping to [0, 1] and deriving the recommendation
    ///
    /// Empty `categories` default to the score tier label.
    pub fn new(
        score: f64,
        reason: impl Into<String>,
        categories: Vec<String>,
        quality_indicators: Vec<String>,
        problems_detected: Vec<String>,
        ai_used: bool,
    ) -> Self {
        let score = clamp_score(score);
        let categories = if categories.is_empty() {
            vec![tier_label(score).to_string()]
        } else {
            categories
        };

        Self {
            score,
            reason: reason.into(),
            categories,
            is_recommended: score >= RECOMMENDED_THRESHOLD,
            quality_indicators,
            problems_detected,
            ai_used,
        }
    }

    /// Re-establish the score invariants on a value from outside the crate
    pub fn normalized(self) -> Self {
        Self::new(
            self.score,
            self.reason,
            self.categories,
            self.quality_indicators,
            self.problems_detected,
            self.ai_used,
        )
    }
}

/// Clamp to [0, 1]; NaN maps to 0
fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Tier label used when no explicit category applies
pub fn tier_label(score: f64) -> &'static str {
    if score >= 0.7 {
        "high_quality"
    } else if score >= RECOMMENDED_THRESHOLD {
        "acceptable"
    } else if score >= 0.35 {
        "low_quality"
    } else {
        "poor_quality"
    }
}

/// Basic text statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStatistics {
    pub char_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub avg_word_length: f64,
    pub avg_sentence_length: f64,
    /// Estimated reading time at 200 words per minute
    pub reading_time_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// Lexicon sentiment polarity in [-1, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub label: SentimentLabel,
    pub positive_words: usize,
    pub negative_words: usize,
}

/// Readability metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readability {
    pub flesch_reading_ease: f64,
    pub flesch_kincaid_grade: f64,
    pub avg_syllables_per_word: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synopsis {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorialAnalysis {
    /// Overall stance or slant of the piece
    pub stance: String,
    #[serde(default)]
    pub bias_indicators: Vec<String>,
    #[serde(default)]
    pub credibility: f64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDetection {
    pub likely_ai_generated: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub signals: Vec<String>,
}

/// Offline metadata for one image referenced by a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub url: String,
    pub host: String,
    pub file_name: Option<String>,
    pub format: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Persisted analysis of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub statistics: TextStatistics,
    pub sentiment: Option<Sentiment>,
    pub readability: Option<Readability>,
    pub quality_score: Option<TextQualityScore>,
    pub cleaned_text: Option<String>,
    pub synopsis: Option<Synopsis>,
    pub editorial: Option<EditorialAnalysis>,
    pub ai_detection: Option<AiDetection>,
    pub tags: Vec<String>,
    pub images: Vec<ImageMetadata>,
}

impl AnalysisRecord {
    /// Empty record for a freshly assigned analysis id
    pub fn new(id: Uuid) -> Self {
        let now = docflow_common::time::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            statistics: TextStatistics::default(),
            sentiment: None,
            readability: None,
            quality_score: None,
            cleaned_text: None,
            synopsis: None,
            editorial: None,
            ai_detection: None,
            tags: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// Insert image metadata, replacing an entry with the same URL
pub fn merge_image(images: &mut Vec<ImageMetadata>, image: ImageMetadata) {
    match images.iter_mut().find(|i| i.url == image.url) {
        Some(existing) => *existing = image,
        None => images.push(image),
    }
}

/// Stage 2 text enrichment to merge into an existing record
///
/// `None` fields leave the record untouched. Tags replace the existing set
/// only when non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentPatch {
    pub synopsis: Option<Synopsis>,
    pub cleaned_text: Option<String>,
    pub editorial: Option<EditorialAnalysis>,
    pub ai_detection: Option<AiDetection>,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_clamped_and_recommendation_derived() {
        let high = TextQualityScore::new(1.7, "great", vec![], vec![], vec![], false);
        assert_eq!(high.score, 1.0);
        assert!(high.is_recommended);
        assert_eq!(high.categories, vec!["high_quality"]);

        let low = TextQualityScore::new(-0.2, "bad", vec![], vec![], vec![], false);
        assert_eq!(low.score, 0.0);
        assert!(!low.is_recommended);
        assert_eq!(low.categories, vec!["poor_quality"]);

        let nan = TextQualityScore::new(f64::NAN, "?", vec![], vec![], vec![], true);
        assert_eq!(nan.score, 0.0);
    }

    #[test]
    fn test_recommended_boundary() {
        assert!(TextQualityScore::new(0.5, "", vec![], vec![], vec![], false).is_recommended);
        assert!(!TextQualityScore::new(0.4999, "", vec![], vec![], vec![], false).is_recommended);
    }

    #[test]
    fn test_explicit_categories_are_kept() {
        let score = TextQualityScore::new(0.2, "", vec!["spam".to_string()], vec![], vec![], false);
        assert_eq!(score.categories, vec!["spam"]);
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(tier_label(0.9), "high_quality");
        assert_eq!(tier_label(0.55), "acceptable");
        assert_eq!(tier_label(0.35), "low_quality");
        assert_eq!(tier_label(0.1), "poor_quality");
    }

    #[test]
    fn test_normalized_repairs_inconsistent_score() {
        let raw = TextQualityScore {
            score: 3.0,
            reason: "from provider".to_string(),
            categories: vec![],
            is_recommended: false,
            quality_indicators: vec![],
            problems_detected: vec![],
            ai_used: true,
        };
        let fixed = raw.normalized();
        assert_eq!(fixed.score, 1.0);
        assert!(fixed.is_recommended);
        assert!(fixed.ai_used);
    }

    #[test]
    fn test_merge_image_replaces_same_url() {
        let mut images = Vec::new();
        let image = |format: &str| ImageMetadata {
            url: "https://cdn.example.com/a.png".to_string(),
            host: "cdn.example.com".to_string(),
            file_name: Some("a.png".to_string()),
            format: format.to_string(),
            analyzed_at: Utc::now(),
        };

        merge_image(&mut images, image("png"));
        merge_image(&mut images, image("webp"));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].format, "webp");

        let mut other = image("gif");
        other.url = "https://cdn.example.com/b.gif".to_string();
        merge_image(&mut images, other);
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].format, "gif");
    }

    #[test]
    fn test_record_json_round_trip_keeps_optional_fields() {
        let mut record = AnalysisRecord::new(Uuid::new_v4());
        record.ai_detection = Some(AiDetection {
            likely_ai_generated: false,
            confidence: 0.8,
            signals: vec![],
        });
        let json = serde_json::to_string(&record).unwrap();
        let back: AnalysisRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
