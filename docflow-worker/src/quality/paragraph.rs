//! Paragraph scoring
//!
//! Each paragraph starts from a neutral 0.5 and collects independent
//! adjustments. The adjustments reward natural prose (sentence-sized word
//! counts, a healthy share of function words, named entities) and penalize
//! the things scrapers drag in alongside the article: link lists, photo
//! credits, navigation and legal footers, share prompts and bylines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::vocab::{
    self, BOILERPLATE_PHRASES, BYLINE_PREFIXES, IMAGE_MARKERS, MONTHS, NAV_LINK_MAX_WORDS,
    NAV_LINK_PHRASES, SOCIAL_PROMPTS,
};

const NEUTRAL_SCORE: f64 = 0.5;

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}|\d{4}-\d{2}-\d{2})\b")
        .expect("numeric date pattern is valid")
});

static READ_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+\s*(min|mins|minute|minutes)\s+read\b").expect("read time pattern is valid")
});

static ORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}[.)]\s").expect("ordered item pattern is valid"));

/// Score and feature breakdown for a single paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphScore {
    pub text: String,
    /// Content likelihood in [0, 1]
    pub score: f64,
    pub word_count: usize,
    pub link_density: f64,
    pub stopword_ratio: f64,
    pub named_entity_count: usize,
    pub capitalized_ratio: f64,
    pub avg_word_length: f64,
    pub has_image_marker: bool,
    pub is_boilerplate: bool,
    /// Human-readable list of the adjustments that fired
    pub reasons: Vec<String>,
}

/// Score one paragraph of text
pub fn score_paragraph(text: &str) -> ParagraphScore {
    let trimmed = text.trim();
    let raw_words: Vec<&str> = trimmed.split_whitespace().collect();
    let words: Vec<&str> = raw_words
        .iter()
        .map(|w| vocab::trim_token(w))
        .filter(|w| !w.is_empty())
        .collect();
    let word_count = words.len();

    let mut score = NEUTRAL_SCORE;
    let mut reasons = Vec::new();

    // Word count sweet spot
    if (20..=200).contains(&word_count) {
        score += 0.2;
        reasons.push("optimal length".to_string());
    } else if word_count < 10 {
        score -= 0.3;
        reasons.push("too short".to_string());
    } else if word_count > 300 {
        score -= 0.1;
        reasons.push("very long".to_string());
    }

    // Link density
    let link_count = raw_words.iter().filter(|w| is_link_like(w)).count();
    let link_density = ratio(link_count, raw_words.len());
    if link_density > 0.1 {
        score -= 0.4;
        reasons.push(format!("high link density ({:.0}%)", link_density * 100.0));
    }

    // Natural language check via function word share
    let stopword_count = words
        .iter()
        .filter(|w| vocab::is_stopword(&w.to_lowercase()))
        .count();
    let stopword_ratio = ratio(stopword_count, word_count);
    if word_count > 0 {
        if (0.35..=0.65).contains(&stopword_ratio) {
            score += 0.15;
            reasons.push("natural language".to_string());
        } else if stopword_ratio < 0.25 {
            score -= 0.2;
            reasons.push("few function words".to_string());
        }
    }

    // Named entities
    let named_entity_count = count_named_entities(&raw_words);
    if named_entity_count >= 2 {
        score += 0.1;
        reasons.push(format!("{} named entities", named_entity_count));
    }

    // Average word length balance
    let letter_total: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_length = if word_count == 0 {
        0.0
    } else {
        letter_total as f64 / word_count as f64
    };
    if (4.0..=6.0).contains(&avg_word_length) {
        score += 0.1;
        reasons.push("balanced word length".to_string());
    }

    // Photo captions and credits
    let has_image_marker = vocab::contains_any(trimmed, IMAGE_MARKERS);
    if has_image_marker {
        score -= 0.4;
        reasons.push("image caption or credit".to_string());
    }

    // Navigation, calls to action, legal text
    let is_boilerplate = vocab::contains_any(trimmed, BOILERPLATE_PHRASES)
        || (word_count <= NAV_LINK_MAX_WORDS && vocab::contains_any(trimmed, NAV_LINK_PHRASES));
    if is_boilerplate {
        score -= 0.5;
        reasons.push("boilerplate phrase".to_string());
    }

    // Shouting
    let capitalized_ratio = uppercase_ratio(trimmed);
    if capitalized_ratio > 0.5 {
        score -= 0.3;
        reasons.push("excessive capitalization".to_string());
    }

    // Punctuation overload
    let non_ws = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    let punct = trimmed.chars().filter(|c| c.is_ascii_punctuation()).count();
    if non_ws >= 10 && ratio(punct, non_ws) > 0.15 {
        score -= 0.2;
        reasons.push("punctuation overload".to_string());
    }

    // Short list items
    if is_list_item(trimmed) && word_count < 15 {
        score -= 0.2;
        reasons.push("short list item".to_string());
    }

    // Social share prompts
    if vocab::contains_any(trimmed, SOCIAL_PROMPTS) {
        score -= 0.3;
        reasons.push("social share prompt".to_string());
    }

    // Bylines and datelines
    if word_count < 15 && looks_like_metadata(trimmed) {
        score -= 0.3;
        reasons.push("byline or date metadata".to_string());
    }

    // Headlines and menu entries rarely end like sentences
    if word_count >= 3 && !ends_like_sentence(trimmed) {
        score -= 0.1;
        reasons.push("no sentence punctuation".to_string());
    }

    ParagraphScore {
        text: trimmed.to_string(),
        score: score.clamp(0.0, 1.0),
        word_count,
        link_density,
        stopword_ratio,
        named_entity_count,
        capitalized_ratio,
        avg_word_length,
        has_image_marker,
        is_boilerplate,
        reasons,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn is_link_like(word: &str) -> bool {
    let lower = word
        .trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | '<' | '>' | ',' | '"'))
        .to_lowercase();
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || lower.contains("://")
    {
        return true;
    }
    let bare = lower.trim_end_matches(|c: char| matches!(c, '.' | ';' | ':' | '!' | '?'));
    [".com", ".org", ".net", ".io", ".html", ".php"]
        .iter()
        .any(|tld| bare.ends_with(tld) && bare.len() > tld.len())
}

/// Capitalized words that do not open a sentence and are not function words
fn count_named_entities(raw_words: &[&str]) -> usize {
    let mut count = 0;
    let mut sentence_start = true;
    for raw in raw_words {
        let word = vocab::trim_token(raw);
        if !word.is_empty() && !sentence_start {
            let mut chars = word.chars();
            let first_upper = chars.next().map(|c| c.is_uppercase()).unwrap_or(false);
            let has_lower = chars.any(|c| c.is_lowercase());
            if first_upper && has_lower && !vocab::is_stopword(&word.to_lowercase()) {
                count += 1;
            }
        }
        sentence_start = raw.ends_with(['.', '!', '?', ':']);
    }
    count
}

fn uppercase_ratio(text: &str) -> f64 {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    ratio(upper, letters)
}

fn is_list_item(text: &str) -> bool {
    text.starts_with(['-', '*', '•', '·', '–', '>']) || ORDERED_ITEM.is_match(text)
}

fn looks_like_metadata(text: &str) -> bool {
    let lower = text.to_lowercase();
    if BYLINE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    if NUMERIC_DATE.is_match(text) || READ_TIME.is_match(text) {
        return true;
    }
    // Month name next to a number, e.g. "March 3, 2024"
    let toks = vocab::tokens(text);
    toks.windows(2).any(|pair| {
        let (a, b) = (&pair[0], &pair[1]);
        (MONTHS.contains(&a.as_str()) && b.chars().all(|c| c.is_ascii_digit()))
            || (a.chars().all(|c| c.is_ascii_digit()) && MONTHS.contains(&b.as_str()))
    })
}

fn ends_like_sentence(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|c| matches!(c, '.' | '!' | '?' | '"' | '\'' | '”' | '’' | ')' | ':' | ';'))
        .unwrap_or(false)
}
