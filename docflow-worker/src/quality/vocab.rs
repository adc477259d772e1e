//! Word lists and token helpers shared by the paragraph and document scorers

/// Common English function words
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "also", "may", "might", "must", "said", "says", "one", "us",
];

/// Navigation, call-to-action and legal phrases that mark non-article paragraphs
pub const BOILERPLATE_PHRASES: &[&str] = &[
    "all rights reserved",
    "privacy policy",
    "terms of service",
    "terms of use",
    "terms and conditions",
    "cookie policy",
    "we use cookies",
    "accept cookies",
    "accept all cookies",
    "subscribe to our newsletter",
    "sign up for our newsletter",
    "newsletter signup",
    "skip to content",
    "skip to main content",
    "back to top",
    "main menu",
    "toggle navigation",
    "related articles",
    "recommended for you",
    "you may also like",
    "read more",
    "continue reading",
    "click here",
    "advertisement",
    "sponsored content",
    "log in to comment",
    "leave a comment",
    "sign in to continue",
    "create an account",
];

/// Site navigation labels that also occur in ordinary prose
///
/// Only count as boilerplate in paragraphs of at most
/// [`NAV_LINK_MAX_WORDS`] words.
pub const NAV_LINK_PHRASES: &[&str] = &["contact us", "about us"];

pub const NAV_LINK_MAX_WORDS: usize = 8;

/// Photo caption and image attribution phrases
pub const IMAGE_MARKERS: &[&str] = &[
    "photo by",
    "photo credit",
    "photograph by",
    "image credit",
    "image courtesy",
    "illustration by",
    "getty images",
    "shutterstock",
    "file photo",
    "pictured above",
    "photo:",
    "image:",
    "caption:",
    "pictured:",
    "(photo",
    "(image",
];

/// Social share prompts
pub const SOCIAL_PROMPTS: &[&str] = &[
    "share this",
    "share on facebook",
    "share on twitter",
    "share on linkedin",
    "share via email",
    "tweet this",
    "pin it",
    "follow us",
    "like us on facebook",
    "share this article",
];

/// Byline and publication metadata prefixes
pub const BYLINE_PREFIXES: &[&str] = &[
    "by ",
    "written by",
    "posted by",
    "posted on",
    "published",
    "updated",
    "last updated",
    "author:",
    "filed under",
];

/// Month names used to spot dateline fragments
pub const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
];

/// Promotional vocabulary
pub const SPAM_KEYWORDS: &[&str] = &[
    "buy now",
    "click here",
    "limited offer",
    "limited time",
    "act now",
    "order now",
    "call now",
    "subscribe now",
    "don't miss",
    "free money",
    "100% free",
    "risk free",
    "make money fast",
    "earn money",
    "best price",
    "special promotion",
    "no credit check",
    "winner",
    "congratulations",
    "guaranteed",
    "casino",
    "discount code",
];

/// Connectives that signal argumentative flow between sentences
pub const TRANSITION_WORDS: &[&str] = &[
    "however",
    "therefore",
    "moreover",
    "furthermore",
    "additionally",
    "consequently",
    "meanwhile",
    "nevertheless",
    "although",
    "because",
    "thus",
    "hence",
    "instead",
    "finally",
    "similarly",
    "for example",
    "for instance",
    "in addition",
    "as a result",
    "on the other hand",
    "in contrast",
    "in fact",
    "after that",
    "since",
    "while",
];

/// Referential words that tie a sentence back to earlier text
pub const COHERENCE_MARKERS: &[&str] = &[
    "the", "this", "that", "these", "those", "it", "its", "they", "them", "their", "he", "she",
    "his", "her", "which", "such",
];

/// Vocabulary typical of informative or academic writing
pub const INFORMATIVE_KEYWORDS: &[&str] = &[
    "research",
    "study",
    "studies",
    "analysis",
    "according to",
    "evidence",
    "data",
    "findings",
    "published",
    "university",
    "report",
    "experts",
    "survey",
    "percent",
    "scientists",
    "journal",
    "researchers",
];

/// Strip leading and trailing non-alphanumeric characters
pub fn trim_token(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Lowercased alphanumeric tokens
pub fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(trim_token)
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercase, replace punctuation with spaces and pad with spaces so that
/// `" phrase "` lookups only match whole words.
pub fn normalize_for_match(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' || c == '%' {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Count whole-word occurrences of `phrase` in text already passed through
/// [`normalize_for_match`]. Phrases containing punctuation other than
/// apostrophes or percent signs are matched against `lower_raw` instead.
pub fn count_phrase(normalized: &str, lower_raw: &str, phrase: &str) -> usize {
    let needs_raw = phrase
        .chars()
        .any(|c| !(c.is_alphanumeric() || c == ' ' || c == '\'' || c == '%'));
    if needs_raw {
        return lower_raw.matches(phrase).count();
    }
    let needle = format!(" {} ", phrase);
    // Matches share their boundary spaces, so scan with overlap
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = normalized[start..].find(&needle) {
        count += 1;
        start += pos + needle.len() - 1;
    }
    count
}

/// Total occurrences of any phrase in `phrases`
pub fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    let normalized = normalize_for_match(text);
    let lower_raw = text.to_lowercase();
    phrases
        .iter()
        .map(|p| count_phrase(&normalized, &lower_raw, p))
        .sum()
}

/// True when any phrase in `phrases` occurs in text
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let normalized = normalize_for_match(text);
    let lower_raw = text.to_lowercase();
    phrases
        .iter()
        .any(|p| count_phrase(&normalized, &lower_raw, p) > 0)
}
