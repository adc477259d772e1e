//! Rule-based document quality scoring
//!
//! Used when no AI provider is available, and as the fallback when the
//! provider's quality call fails. The score is the quality gate consulted by
//! Stage 1 before any enrichment is enqueued.

use std::collections::HashSet;

use super::vocab::{
    self, COHERENCE_MARKERS, INFORMATIVE_KEYWORDS, SPAM_KEYWORDS, TRANSITION_WORDS,
};
use crate::models::TextQualityScore;

const BASE_SCORE: f64 = 0.5;
const EXTREMELY_SHORT_SCORE: f64 = 0.1;
const MIN_CHARS: usize = 50;

/// Sentences shorter than this (in words) count toward list-like structure
const SHORT_SENTENCE_WORDS: usize = 10;
/// Jaccard similarity below which adjacent sentences share no topic
const LOW_OVERLAP: f64 = 0.15;
const SPAM_HIT_LIMIT: usize = 3;
const GIBBERISH_RUN_LIMIT: usize = 5;

/// Score a whole document without calling any external service
///
/// # Arguments
/// * `text` - Raw document text
/// * `word_count` - Word count from the offline statistics
/// * `readability_score` - Flesch reading ease from the offline analyzer
pub fn score_text_quality_fallback(
    text: &str,
    word_count: usize,
    readability_score: f64,
) -> TextQualityScore {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_CHARS {
        return TextQualityScore::new(
            EXTREMELY_SHORT_SCORE,
            "Text is too short to evaluate",
            vec!["too_short".to_string()],
            Vec::new(),
            vec!["extremely_short".to_string()],
            false,
        );
    }

    let mut score = BASE_SCORE;
    let mut categories: Vec<String> = Vec::new();
    let mut indicators: Vec<String> = Vec::new();
    let mut problems: Vec<String> = Vec::new();

    let sentences = split_sentences(trimmed);
    let sentence_count = sentences.len().max(1);
    let tokens = vocab::tokens(trimmed);

    // Word count
    if word_count < 20 {
        score -= 0.3;
        problems.push("too_few_words".to_string());
    } else if word_count < 50 {
        score -= 0.15;
        problems.push("short_text".to_string());
    } else if word_count >= 100 {
        score += 0.1;
        indicators.push("substantial_length".to_string());
    }

    // List-like structure: mostly short sentences that share no vocabulary
    if is_list_like(&sentences) {
        score -= 0.4;
        categories.push("list_like".to_string());
        problems.push("list_like_structure".to_string());
    }

    // Transition density
    let transitions = vocab::count_phrases(trimmed, TRANSITION_WORDS);
    let transition_ratio = transitions as f64 / sentence_count as f64;
    if word_count >= 100 && transition_ratio < 0.1 {
        score -= 0.15;
        problems.push("few_transitions".to_string());
    } else if transition_ratio >= 0.2 {
        score += 0.1;
        indicators.push("good_flow".to_string());
    }

    // Referential coherence
    let coherence_hits = tokens
        .iter()
        .filter(|t| COHERENCE_MARKERS.contains(&t.as_str()))
        .count();
    let coherence_ratio = ratio(coherence_hits, tokens.len());
    if (0.05..=0.15).contains(&coherence_ratio) {
        score += 0.1;
        indicators.push("coherent".to_string());
    } else if word_count >= 100 {
        score -= 0.1;
        problems.push("low_coherence".to_string());
    }

    // Spam vocabulary
    let spam_hits = vocab::count_phrases(trimmed, SPAM_KEYWORDS);
    if spam_hits > SPAM_HIT_LIMIT {
        score -= 0.4;
        categories.push("spam".to_string());
        problems.push(format!("spam_keywords ({})", spam_hits));
    }

    // Exclamation marks
    let exclamations = trimmed.chars().filter(|&c| c == '!').count();
    if exclamations as f64 / sentence_count as f64 > 0.3 {
        score -= 0.2;
        problems.push("excessive_exclamation".to_string());
    }

    // Shouting
    if uppercase_ratio(trimmed) > 0.5 {
        score -= 0.3;
        problems.push("excessive_caps".to_string());
    }

    // Readability
    if (60.0..=70.0).contains(&readability_score) {
        score += 0.1;
        indicators.push("readable".to_string());
    } else if readability_score < 30.0 || readability_score > 90.0 {
        score -= 0.1;
        problems.push("poor_readability".to_string());
    }

    // Sentence length
    let words_per_sentence = tokens.len() as f64 / sentence_count as f64;
    if (10.0..=25.0).contains(&words_per_sentence) {
        score += 0.1;
        indicators.push("good_sentence_length".to_string());
    }

    // Gibberish
    if repeated_char_runs(trimmed) > GIBBERISH_RUN_LIMIT {
        score -= 0.3;
        categories.push("incoherent".to_string());
        problems.push("repeated_characters".to_string());
    }

    // Informative vocabulary
    if vocab::count_phrases(trimmed, INFORMATIVE_KEYWORDS) >= 3 {
        score += 0.1;
        indicators.push("informative".to_string());
    }

    let reason = build_reason(&indicators, &problems);
    TextQualityScore::new(score, reason, categories, indicators, problems, false)
}

/// Sentences split on line breaks and terminal punctuation
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c: char| matches!(c, '\n' | '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

fn content_words(sentence: &str) -> HashSet<String> {
    vocab::tokens(sentence)
        .into_iter()
        .filter(|w| w.chars().count() > 2 && !vocab::is_stopword(w))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn is_list_like(sentences: &[&str]) -> bool {
    if sentences.len() < 3 {
        return false;
    }

    let short = sentences
        .iter()
        .filter(|s| vocab::tokens(s).len() < SHORT_SENTENCE_WORDS)
        .count();
    let short_ratio = ratio(short, sentences.len());

    let sets: Vec<HashSet<String>> = sentences.iter().map(|s| content_words(s)).collect();
    let low_overlap = sets
        .windows(2)
        .filter(|pair| jaccard(&pair[0], &pair[1]) < LOW_OVERLAP)
        .count();
    let low_ratio = ratio(low_overlap, sets.len() - 1);

    short_ratio > 0.6 && low_ratio > 0.5
}

/// Positions where three identical letters appear in a row
fn repeated_char_runs(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    chars
        .windows(3)
        .filter(|w| w[0].is_alphabetic() && w[0] == w[1] && w[1] == w[2])
        .count()
}

fn uppercase_ratio(text: &str) -> f64 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    ratio(upper, letters.len())
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn build_reason(indicators: &[String], problems: &[String]) -> String {
    match (indicators.is_empty(), problems.is_empty()) {
        (true, true) => "No strong quality signals detected".to_string(),
        (false, true) => format!("Positive signals: {}", indicators.join(", ")),
        (true, false) => format!("Problems: {}", problems.join(", ")),
        (false, false) => format!(
            "Problems: {}; positive signals: {}",
            problems.join(", "),
            indicators.join(", ")
        ),
    }
}
