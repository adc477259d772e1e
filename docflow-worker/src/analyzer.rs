//! Offline document analyzer
//!
//! Computes everything Stage 1 needs without an external call: text
//! statistics, lexicon sentiment, Flesch readability, the rule-based quality
//! score and the offline-cleaned text.

use crate::models::{Readability, Sentiment, SentimentLabel, TextQualityScore, TextStatistics};
use crate::quality::{self, vocab};

const WORDS_PER_MINUTE: f64 = 200.0;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "positive", "success", "successful", "improve", "improved",
    "improvement", "benefit", "benefits", "gain", "gains", "growth", "strong", "win", "wins",
    "happy", "love", "best", "better", "effective", "progress", "support", "welcome",
    "approved", "celebrate", "record", "safe", "innovative", "opportunity", "hope",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "terrible", "negative", "failure", "fail", "failed", "decline", "declined",
    "loss", "losses", "weak", "crisis", "risk", "risks", "worse", "worst", "problem",
    "problems", "damage", "danger", "dangerous", "concern", "concerns", "angry", "hate",
    "critics", "threat", "delay", "delays", "cut", "cuts", "scandal",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "without", "hardly", "isn't", "wasn't", "don't"];

/// Everything the offline analyzer derives from one document
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineAnalysis {
    pub statistics: TextStatistics,
    pub sentiment: Sentiment,
    pub readability: Readability,
    pub quality: TextQualityScore,
    pub cleaned_text: String,
}

/// Stage 1 analysis step
///
/// Injected into the document handler so tests can pin the quality score.
pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> OfflineAnalysis;
}

/// Default rule-based analyzer
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAnalyzer;

impl DocumentAnalyzer for OfflineAnalyzer {
    fn analyze(&self, text: &str) -> OfflineAnalysis {
        let statistics = text_statistics(text);
        let readability = readability(text);
        let quality = quality::score_text_quality_fallback(
            text,
            statistics.word_count,
            readability.flesch_reading_ease,
        );

        OfflineAnalysis {
            sentiment: sentiment(text),
            cleaned_text: quality::clean_text_offline(text),
            statistics,
            readability,
            quality,
        }
    }
}

pub fn text_statistics(text: &str) -> TextStatistics {
    let words = vocab::tokens(text);
    let word_count = words.len();
    let sentence_count = quality::document::split_sentences(text).len();
    let letters: usize = words.iter().map(|w| w.chars().count()).sum();

    TextStatistics {
        char_count: text.chars().count(),
        word_count,
        sentence_count,
        paragraph_count: quality::split_into_paragraphs(text).len(),
        avg_word_length: ratio(letters as f64, word_count),
        avg_sentence_length: ratio(word_count as f64, sentence_count),
        reading_time_minutes: word_count as f64 / WORDS_PER_MINUTE,
    }
}

/// Lexicon polarity; a negation within the two preceding words flips a hit
pub fn sentiment(text: &str) -> Sentiment {
    let words = vocab::tokens(text);
    let mut positive = 0usize;
    let mut negative = 0usize;

    for (i, word) in words.iter().enumerate() {
        let polarity = if POSITIVE_WORDS.contains(&word.as_str()) {
            1i8
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            -1
        } else {
            continue;
        };

        let negated = words[i.saturating_sub(2)..i]
            .iter()
            .any(|w| NEGATIONS.contains(&w.as_str()));
        match (polarity > 0) != negated {
            true => positive += 1,
            false => negative += 1,
        }
    }

    let total = positive + negative;
    let score = if total == 0 {
        0.0
    } else {
        (positive as f64 - negative as f64) / total as f64
    };
    let label = if score > 0.1 {
        SentimentLabel::Positive
    } else if score < -0.1 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    Sentiment {
        score,
        label,
        positive_words: positive,
        negative_words: negative,
    }
}

pub fn readability(text: &str) -> Readability {
    let words = vocab::tokens(text);
    let sentences = quality::document::split_sentences(text).len();
    if words.is_empty() || sentences == 0 {
        return Readability::default();
    }

    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;

    Readability {
        flesch_reading_ease: 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word,
        flesch_kincaid_grade: 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59,
        avg_syllables_per_word: syllables_per_word,
    }
}

/// Vowel-group syllable estimate, at least one per word
pub fn count_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let chars: Vec<char> = lower.chars().filter(|c| c.is_alphabetic()).collect();
    if chars.is_empty() {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for &c in &chars {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    // Silent trailing "e" ("make"), but not "-le" ("table")
    let n = chars.len();
    if count > 1 && chars[n - 1] == 'e' && !(n >= 3 && chars[n - 2] == 'l' && !is_vowel(chars[n - 3])) {
        count -= 1;
    }

    count.max(1)
}

fn ratio(part: f64, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_syllables() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("table"), 2);
        assert_eq!(count_syllables("reading"), 2);
        assert_eq!(count_syllables("beautiful"), 3);
        assert_eq!(count_syllables("rhythm"), 1);
        assert_eq!(count_syllables("2024"), 1);
    }

    #[test]
    fn test_text_statistics() {
        let stats = text_statistics("The cat sat. The dog ran far!\n\nA bird sang.");
        assert_eq!(stats.word_count, 10);
        assert_eq!(stats.sentence_count, 3);
        assert_eq!(stats.paragraph_count, 2);
        assert!((stats.reading_time_minutes - 0.05).abs() < 1e-9);
        assert!((stats.avg_sentence_length - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_of_empty_text() {
        let stats = text_statistics("");
        assert_eq!(stats, TextStatistics::default());
    }

    #[test]
    fn test_sentiment_labels() {
        assert_eq!(
            sentiment("The plan was a great success with strong support.").label,
            SentimentLabel::Positive
        );
        assert_eq!(
            sentiment("The crisis caused damage and heavy losses.").label,
            SentimentLabel::Negative
        );
        assert_eq!(sentiment("The meeting is on Tuesday.").label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_sentiment_negation_flips() {
        let result = sentiment("The results were not good.");
        assert_eq!(result.negative_words, 1);
        assert_eq!(result.positive_words, 0);
        assert_eq!(result.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_sentiment_score_bounds() {
        for text in ["good good good", "bad bad", "good bad", ""] {
            let score = sentiment(text).score;
            assert!((-1.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_readability_simple_text_is_easy() {
        let easy = readability("The cat sat on the mat. The dog ran to the park.");
        assert!(easy.flesch_reading_ease > 90.0);
        assert!(easy.flesch_kincaid_grade < 3.0);
        assert_eq!(readability(""), Readability::default());
    }

    #[test]
    fn test_analyze_fills_every_part() {
        let text = "Researchers at the state university published a new study on urban heat this week. \
            The study found that neighborhoods with more trees were cooler during summer afternoons.\n\n\
            Privacy Policy | Terms of Service | All rights reserved";
        let analysis = OfflineAnalyzer.analyze(text);

        assert!(analysis.statistics.word_count > 20);
        assert!(!analysis.quality.ai_used);
        assert!(analysis.cleaned_text.contains("urban heat"));
        assert!(!analysis.cleaned_text.contains("Privacy Policy"));
    }
}
