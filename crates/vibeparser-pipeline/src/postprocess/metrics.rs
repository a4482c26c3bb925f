// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quality metrics for a processed extraction.

use vibeparser_core::{QualityMetrics, RawExtractionResult, Section};

use super::clean::is_garbage_token;

/// Characters a full page is expected to yield.
pub const EXPECTED_CHARS_PER_PAGE: f64 = 300.0;
/// Paragraph length treated as fully formed.
pub const FULL_PARAGRAPH_CHARS: f64 = 200.0;
/// Mean word length readability is centred on.
pub const IDEAL_WORD_CHARS: f64 = 5.0;
/// Mean sentence length coherence is centred on.
pub const IDEAL_SENTENCE_WORDS: f64 = 20.0;

/// Score an extraction from its raw pages and processed text.
///
/// Every metric is in `[0, 1]` and is 0 for empty text.
pub fn assess_quality(
    raw: &RawExtractionResult,
    cleaned: &str,
    sections: &[Section],
) -> QualityMetrics {
    let readability = readability(cleaned);
    let coherence = coherence(sections);
    let completeness = completeness(raw, cleaned, sections);
    let overall = (readability + coherence + completeness) / 3.0;

    QualityMetrics {
        text_density: text_density(cleaned),
        mean_confidence: raw.mean_confidence(),
        artifact_ratio: artifact_ratio(&raw.full_text()),
        completeness_score: round2(completeness),
        readability: round2(readability),
        coherence: round2(coherence),
        overall: round2(overall),
    }
}

/// Share of non-whitespace characters.
pub fn text_density(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    visible as f64 / total as f64
}

/// Share of whitespace-separated tokens that look like garbage.
pub fn artifact_ratio(raw_text: &str) -> f64 {
    let mut tokens = 0usize;
    let mut garbage = 0usize;
    for token in raw_text.split_whitespace() {
        tokens += 1;
        if is_garbage_token(token) {
            garbage += 1;
        }
    }
    if tokens == 0 {
        return 0.0;
    }
    garbage as f64 / tokens as f64
}

/// Peaks at words of [`IDEAL_WORD_CHARS`] characters.
pub fn readability(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let chars: usize = words.iter().map(|word| word.chars().count()).sum();
    let mean = chars as f64 / words.len() as f64;
    (1.0 - (mean - IDEAL_WORD_CHARS).abs() / 10.0).max(0.0)
}

/// Peaks at sentences of [`IDEAL_SENTENCE_WORDS`] words.
pub fn coherence(sections: &[Section]) -> f64 {
    let mut sentences = 0usize;
    let mut words = 0usize;
    for sentence in sections
        .iter()
        .flat_map(|section| &section.paragraphs)
        .flat_map(|paragraph| &paragraph.sentences)
    {
        sentences += 1;
        words += sentence.split_whitespace().count();
    }
    if sentences == 0 {
        return 0.0;
    }
    let mean = words as f64 / sentences as f64;
    (1.0 - (mean - IDEAL_SENTENCE_WORDS).abs() / 50.0).max(0.0)
}

/// Page success scaled by text volume and paragraph fullness.
pub fn completeness(raw: &RawExtractionResult, cleaned: &str, sections: &[Section]) -> f64 {
    let processed = raw.pages.len();
    if processed == 0 {
        return 0.0;
    }
    let success = raw.succeeded_pages() as f64 / processed as f64;

    let table_chars: usize = raw
        .pages
        .iter()
        .filter_map(|page| page.content())
        .flat_map(|content| &content.table_blocks)
        .flat_map(|table| &table.rows)
        .flatten()
        .map(|cell| cell.chars().filter(|c| !c.is_whitespace()).count())
        .sum();
    let text_chars = cleaned.chars().filter(|c| !c.is_whitespace()).count();
    let expected = processed as f64 * EXPECTED_CHARS_PER_PAGE;
    let volume = ((text_chars + table_chars) as f64 / expected).min(1.0);

    let lengths: Vec<usize> = sections
        .iter()
        .flat_map(|section| &section.paragraphs)
        .map(|paragraph| paragraph.text().chars().count())
        .collect();
    let fullness = if lengths.is_empty() {
        0.0
    } else {
        let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
        (mean / FULL_PARAGRAPH_CHARS).min(1.0)
    };

    success * (0.5 * volume + 0.5 * fullness)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::structure::structure;
    use vibeparser_core::{
        DocumentFormat, ExtractionPath, PageContent, RawPage, TableBlock,
    };

    fn raw_with(pages: Vec<RawPage>) -> RawExtractionResult {
        let mut raw = RawExtractionResult::empty("doc".into(), DocumentFormat::Pdf, ExtractionPath::Native);
        raw.page_count = pages.len();
        raw.pages = pages;
        raw
    }

    fn text_page(index: usize, text: &str) -> RawPage {
        RawPage::extracted(
            index,
            PageContent {
                text: text.into(),
                ..PageContent::default()
            },
        )
    }

    #[test]
    fn empty_text_scores_zero() {
        let raw = raw_with(vec![text_page(0, "")]);
        let metrics = assess_quality(&raw, "", &[]);
        assert_eq!(metrics.text_density, 0.0);
        assert_eq!(metrics.readability, 0.0);
        assert_eq!(metrics.coherence, 0.0);
        assert_eq!(metrics.completeness_score, 0.0);
        assert_eq!(metrics.overall, 0.0);
        assert_eq!(metrics.artifact_ratio, 0.0);
    }

    #[test]
    fn readability_peaks_at_five_letter_words() {
        assert_eq!(readability("apple grape lemon"), 1.0);
        assert!((readability("a b c") - 0.6).abs() < 1e-9);
        assert_eq!(readability(&"x".repeat(40)), 0.0);
    }

    #[test]
    fn coherence_peaks_at_twenty_word_sentences() {
        let sentence = format!("{}.", vec!["word"; 20].join(" "));
        assert_eq!(coherence(&structure(&sentence)), 1.0);
        let short = structure("One. Two. Three.");
        assert!((coherence(&short) - 0.62).abs() < 1e-9);
    }

    #[test]
    fn failed_pages_reduce_completeness() {
        let text = "word ".repeat(80);
        let cleaned = text.trim();
        let sections = structure(cleaned);
        let whole = raw_with(vec![text_page(0, cleaned)]);
        let half = raw_with(vec![text_page(0, cleaned), RawPage::failed(1, "ocr failed")]);

        let full_score = completeness(&whole, cleaned, &sections);
        let half_score = completeness(&half, cleaned, &sections);
        assert!((full_score - 1.0).abs() < 1e-9);
        assert!(half_score < full_score * 0.5 + 1e-9);
    }

    #[test]
    fn table_cells_count_towards_volume() {
        let table = PageContent {
            table_blocks: vec![TableBlock::new(vec![vec!["x".repeat(150), "y".repeat(150)]])],
            ..PageContent::default()
        };
        let raw = raw_with(vec![RawPage::extracted(0, table)]);
        // Volume saturates from table cells alone; no paragraphs.
        assert!((completeness(&raw, "", &[]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn artifacts_are_counted_on_raw_text() {
        assert!((artifact_ratio("good ~~ words here") - 0.25).abs() < 1e-9);
        assert_eq!(artifact_ratio("plain clean words"), 0.0);
    }

    #[test]
    fn density_ignores_whitespace() {
        assert!((text_density("ab  cd") - 4.0 / 6.0).abs() < 1e-9);
    }
}
