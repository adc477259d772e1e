//! Content quality and cleaning engine
//!
//! Pure, synchronous functions with no I/O:
//! - [`score_paragraph`] rates one paragraph as article content vs. scraper debris
//! - [`clean_text_offline`] keeps the paragraphs that pass a per-document threshold
//! - [`score_text_quality_fallback`] produces the document quality score used as
//!   the enrichment gate

pub mod cleaning;
pub mod document;
pub mod paragraph;
pub mod vocab;

pub use cleaning::{
    calculate_dynamic_threshold, clean_text_offline, clean_text_report, split_into_paragraphs,
    CleaningReport,
};
pub use document::score_text_quality_fallback;
pub use paragraph::{score_paragraph, ParagraphScore};
