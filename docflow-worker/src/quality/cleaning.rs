//! Offline document cleaning
//!
//! Splits scraped text into paragraphs, scores each one and keeps the
//! paragraphs that look like article content. The keep threshold adapts to
//! the document: it is the median paragraph score, clamped to [0.3, 0.6], so
//! a uniformly weak scrape still yields its best paragraphs while a clean
//! article does not lose borderline ones.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::paragraph::{score_paragraph, ParagraphScore};

/// Paragraphs longer than this (in characters) are split on single newlines
pub const LONG_PARAGRAPH_CHARS: usize = 1000;

const MIN_THRESHOLD: f64 = 0.3;
const MAX_THRESHOLD: f64 = 0.6;
const EMPTY_THRESHOLD: f64 = 0.5;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph break pattern is valid"));

/// Outcome of cleaning a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Every scored paragraph in input order
    pub paragraphs: Vec<ParagraphScore>,
    /// Threshold applied to paragraph scores
    pub threshold: f64,
    /// Indices into `paragraphs` that survived
    pub kept: Vec<usize>,
}

impl CleaningReport {
    pub fn removed_count(&self) -> usize {
        self.paragraphs.len() - self.kept.len()
    }

    /// Survivors joined with blank lines, in input order
    pub fn cleaned_text(&self) -> String {
        self.kept
            .iter()
            .map(|&i| self.paragraphs[i].text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Split text into trimmed, non-empty paragraphs
///
/// Paragraphs are separated by blank lines. A paragraph longer than
/// [`LONG_PARAGRAPH_CHARS`] is split again on single newlines, since scrapes
/// often flatten whole pages into one block.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();

    for block in PARAGRAPH_BREAK.split(&normalized) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        if block.chars().count() > LONG_PARAGRAPH_CHARS {
            paragraphs.extend(
                block
                    .split('\n')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        } else {
            paragraphs.push(block.to_string());
        }
    }

    paragraphs
}

/// Median of the scores clamped to [0.3, 0.6]; 0.5 for an empty set
///
/// Non-finite scores are ignored.
pub fn calculate_dynamic_threshold(scores: &[f64]) -> f64 {
    let mut finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    if finite.is_empty() {
        return EMPTY_THRESHOLD;
    }
    finite.sort_by(|a, b| a.total_cmp(b));

    let mid = finite.len() / 2;
    let median = if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    };

    median.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
}

/// Score every paragraph and decide which ones to keep
pub fn clean_text_report(text: &str) -> CleaningReport {
    let paragraphs: Vec<ParagraphScore> = split_into_paragraphs(text)
        .iter()
        .map(|p| score_paragraph(p))
        .collect();

    let scores: Vec<f64> = paragraphs.iter().map(|p| p.score).collect();
    let threshold = calculate_dynamic_threshold(&scores);

    let kept = paragraphs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.score >= threshold && !p.is_boilerplate)
        .map(|(i, _)| i)
        .collect();

    CleaningReport {
        paragraphs,
        threshold,
        kept,
    }
}

/// Remove non-article paragraphs from scraped text
///
/// Returns the input unchanged when it contains no paragraphs at all. When
/// paragraphs exist but none pass, the result is empty.
pub fn clean_text_offline(text: &str) -> String {
    let report = clean_text_report(text);
    if report.paragraphs.is_empty() {
        return text.to_string();
    }

    tracing::trace!(
        paragraphs = report.paragraphs.len(),
        kept = report.kept.len(),
        threshold = report.threshold,
        "Offline cleaning complete"
    );

    report.cleaned_text()
}
