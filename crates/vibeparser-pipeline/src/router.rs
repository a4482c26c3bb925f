// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document router: decides NATIVE versus SCANNED before any expensive work.
//
// The decision reads the structural text of at most `ROUTER_SAMPLE_PAGES`
// leading pages, reduces it to three signals in [0, 1], and feeds them to
// `score`, a plain function over `RouterSignals` so the weights can be tuned
// and tested without any I/O. Formats with no page images (text, markup,
// office) skip the score: any visible text makes them NATIVE.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use vibeparser_core::{ClassificationVerdict, DocumentType, Result, VibeError, signals};
use vibeparser_document::{Document, NativeReader, StructuralPage, StructuralReader};

/// Leading pages inspected by the probe.
pub const ROUTER_SAMPLE_PAGES: usize = 3;

/// Non-whitespace characters per page that count as a fully dense page.
pub const DENSE_PAGE_CHARS: f64 = 400.0;

/// Scores strictly above this are NATIVE. A tie is SCANNED.
pub const NATIVE_THRESHOLD: f64 = 0.5;

/// Text quality below this scales the whole score down proportionally.
pub const QUALITY_GATE: f64 = 0.5;

const DENSITY_WEIGHT: f64 = 0.55;
const QUALITY_WEIGHT: f64 = 0.25;
const COVERAGE_WEIGHT: f64 = 0.20;

/// Consecutive symbol characters from which a run counts as suspicious.
const SYMBOL_RUN_MIN: usize = 4;
/// Consecutive whitespace characters from which a run counts as suspicious.
const WHITESPACE_RUN_MIN: usize = 10;
/// Longest token still considered a plausible word.
const MAX_WORD_CHARS: usize = 24;

/// Inputs of the routing score, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterSignals {
    pub text_density: f64,
    pub text_quality: f64,
    pub image_coverage: f64,
}

/// Weighted native score in [0, 1].
///
/// Dense text pulls towards NATIVE, image coverage towards SCANNED. Poor
/// text quality gates the whole score, so a dense layer of garbage (OCR
/// output some scanners bake into the file) still routes to SCANNED.
pub fn score(signals: &RouterSignals) -> f64 {
    let density = signals.text_density.clamp(0.0, 1.0);
    let quality = signals.text_quality.clamp(0.0, 1.0);
    let coverage = signals.image_coverage.clamp(0.0, 1.0);

    let gate = (quality / QUALITY_GATE).min(1.0);
    let weighted =
        DENSITY_WEIGHT * density + QUALITY_WEIGHT * quality + COVERAGE_WEIGHT * (1.0 - coverage);
    (gate * weighted).clamp(0.0, 1.0)
}

/// Verdict type and its confidence for a native score.
pub fn decide(native_score: f64) -> (DocumentType, f64) {
    if native_score > NATIVE_THRESHOLD {
        (DocumentType::Native, native_score)
    } else {
        (DocumentType::Scanned, 1.0 - native_score)
    }
}

/// Classifies documents through a structural reader.
#[derive(Clone)]
pub struct Router {
    reader: Arc<dyn StructuralReader>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Arc::new(NativeReader))
    }
}

impl Router {
    pub fn new(reader: Arc<dyn StructuralReader>) -> Self {
        Self { reader }
    }

    /// Classify `document`.
    ///
    /// Only an unreadable document is an error. A format without a text
    /// layer, or a probe that fails or finds no characters at all, is a
    /// SCANNED verdict with `structural_probe_failed`.
    #[instrument(skip_all, fields(document = %document.name(), format = %document.format()))]
    pub fn identify(&self, document: &Document) -> Result<ClassificationVerdict> {
        let page_count = document.page_count();
        if page_count == 0 {
            info!("Document has no pages; classified as empty");
            return Ok(ClassificationVerdict::empty_document());
        }
        if !document.format().has_text_layer() {
            info!("Format has no text layer; classified SCANNED");
            return Ok(ClassificationVerdict::probe_failed());
        }

        let sampled = page_count.min(ROUTER_SAMPLE_PAGES);
        let pages = match self.reader.read_structural(document, 0..sampled) {
            Ok(pages) => pages,
            Err(err @ VibeError::DocumentUnreadable(_)) => return Err(err),
            Err(err) => {
                info!(%err, "Structural probe failed; classified SCANNED");
                return Ok(ClassificationVerdict::probe_failed());
            }
        };

        let visible: usize = pages.iter().map(StructuralPage::visible_chars).sum();
        if visible == 0 {
            info!(sampled, "Structural probe found no text; classified SCANNED");
            return Ok(ClassificationVerdict::probe_failed());
        }

        let text: String = pages
            .iter()
            .map(StructuralPage::probe_text)
            .collect::<Vec<_>>()
            .join("\n");
        let coverage =
            (0..sampled).map(|index| document.image_coverage(index)).sum::<f64>() / sampled as f64;
        let measured = RouterSignals {
            text_density: text_density(visible, sampled),
            text_quality: text_quality(&text),
            image_coverage: coverage,
        };
        let verdict = if document.format().is_rasterizable() {
            verdict_from(&measured, sampled)
        } else {
            text_only_verdict(&measured, sampled)
        };

        info!(
            document_type = %verdict.document_type,
            confidence = verdict.confidence,
            text_density = measured.text_density,
            text_quality = measured.text_quality,
            image_coverage = measured.image_coverage,
            native_score = verdict.signal(signals::NATIVE_SCORE).unwrap_or_default(),
            sampled,
            "Document classified"
        );
        Ok(verdict)
    }
}

/// Build the verdict for measured signals over `sampled` pages.
pub fn verdict_from(measured: &RouterSignals, sampled: usize) -> ClassificationVerdict {
    let native_score = score(measured);
    let (document_type, confidence) = decide(native_score);

    let mut recorded = BTreeMap::new();
    recorded.insert(signals::TEXT_DENSITY.to_string(), measured.text_density);
    recorded.insert(signals::TEXT_QUALITY.to_string(), measured.text_quality);
    recorded.insert(signals::IMAGE_COVERAGE.to_string(), measured.image_coverage);
    recorded.insert(signals::NATIVE_SCORE.to_string(), native_score);
    recorded.insert(signals::SAMPLED_PAGES.to_string(), sampled as f64);

    ClassificationVerdict {
        document_type,
        confidence,
        signals: recorded,
    }
}

/// Verdict for a format whose only content is its text layer. The signals
/// are still recorded; the score is not consulted.
pub fn text_only_verdict(measured: &RouterSignals, sampled: usize) -> ClassificationVerdict {
    let mut verdict = verdict_from(measured, sampled);
    verdict.document_type = DocumentType::Native;
    verdict.confidence = 1.0;
    verdict
        .signals
        .insert(signals::TEXT_ONLY_FORMAT.to_string(), 1.0);
    verdict
}

/// Visible characters per sampled page against a dense page.
pub fn text_density(visible_chars: usize, sampled_pages: usize) -> f64 {
    if sampled_pages == 0 {
        return 0.0;
    }
    (visible_chars as f64 / sampled_pages as f64 / DENSE_PAGE_CHARS).min(1.0)
}

/// Character-distribution quality of a text sample, in [0, 1].
///
/// Combines the share of alphanumeric characters, the share of tokens that
/// look like words or numbers, and the share of characters outside
/// suspiciously long symbol or whitespace runs.
pub fn text_quality(text: &str) -> f64 {
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    if visible == 0 {
        return 0.0;
    }
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    let alnum_ratio = alnum as f64 / visible as f64;

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let wordlike = tokens.iter().filter(|token| is_wordlike(token)).count();
    let wordlike_ratio = wordlike as f64 / tokens.len().max(1) as f64;

    let total = text.chars().count();
    let run_ratio = suspicious_run_chars(text) as f64 / total as f64;

    let quality = 0.4 * alnum_ratio + 0.4 * wordlike_ratio + 0.2 * (1.0 - run_ratio);
    debug!(alnum_ratio, wordlike_ratio, run_ratio, quality, "Text quality measured");
    quality.clamp(0.0, 1.0)
}

/// A word (letters with inner apostrophes or hyphens) or a number, once
/// surrounding punctuation is stripped.
fn is_wordlike(token: &str) -> bool {
    let core = token.trim_matches(|c: char| !c.is_alphanumeric());
    let length = core.chars().count();
    if length == 0 || length > MAX_WORD_CHARS {
        return false;
    }
    let word = core.chars().any(char::is_alphabetic)
        && core.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-' || c == '’');
    let number =
        core.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '/' | '-'));
    word || number
}

/// Characters inside runs of at least `SYMBOL_RUN_MIN` symbols or
/// `WHITESPACE_RUN_MIN` whitespace characters.
fn suspicious_run_chars(text: &str) -> usize {
    #[derive(PartialEq, Clone, Copy)]
    enum Class {
        Symbol,
        Space,
        Other,
    }
    let classify = |c: char| {
        if c.is_whitespace() {
            Class::Space
        } else if c.is_alphanumeric() {
            Class::Other
        } else {
            Class::Symbol
        }
    };
    let counted = |class: Class, run: usize| match class {
        Class::Symbol if run >= SYMBOL_RUN_MIN => run,
        Class::Space if run >= WHITESPACE_RUN_MIN => run,
        _ => 0,
    };

    let mut total = 0;
    let mut current = Class::Other;
    let mut run = 0;
    for c in text.chars() {
        let class = classify(c);
        if class == current {
            run += 1;
        } else {
            total += counted(current, run);
            current = class;
            run = 1;
        }
    }
    total + counted(current, run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_clean_text_scores_native() {
        let signals = RouterSignals {
            text_density: 1.0,
            text_quality: 0.9,
            image_coverage: 0.0,
        };
        let native_score = score(&signals);
        assert!((native_score - 0.975).abs() < 1e-9);
        assert_eq!(decide(native_score), (DocumentType::Native, native_score));
    }

    #[test]
    fn full_page_images_score_scanned() {
        let signals = RouterSignals {
            text_density: 0.05,
            text_quality: 0.8,
            image_coverage: 1.0,
        };
        let (document_type, confidence) = decide(score(&signals));
        assert_eq!(document_type, DocumentType::Scanned);
        assert!(confidence > 0.7, "confidence {confidence}");
    }

    #[test]
    fn garbage_text_layer_is_gated() {
        let signals = RouterSignals {
            text_density: 1.0,
            text_quality: 0.2,
            image_coverage: 0.0,
        };
        // gate 0.4 * (0.55 + 0.05 + 0.20)
        assert!((score(&signals) - 0.32).abs() < 1e-9);
        assert_eq!(decide(score(&signals)).0, DocumentType::Scanned);
    }

    #[test]
    fn threshold_tie_is_scanned() {
        assert_eq!(decide(NATIVE_THRESHOLD), (DocumentType::Scanned, 0.5));
        assert_eq!(decide(0.51).0, DocumentType::Native);
    }

    #[test]
    fn out_of_range_signals_are_clamped() {
        let signals = RouterSignals {
            text_density: 7.0,
            text_quality: 3.0,
            image_coverage: -1.0,
        };
        assert!((score(&signals) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn verdict_records_every_signal() {
        let measured = RouterSignals {
            text_density: 0.5,
            text_quality: 0.9,
            image_coverage: 0.25,
        };
        let verdict = verdict_from(&measured, 2);
        assert_eq!(verdict.signal(signals::TEXT_DENSITY), Some(0.5));
        assert_eq!(verdict.signal(signals::TEXT_QUALITY), Some(0.9));
        assert_eq!(verdict.signal(signals::IMAGE_COVERAGE), Some(0.25));
        assert_eq!(verdict.signal(signals::SAMPLED_PAGES), Some(2.0));
        assert_eq!(verdict.signal(signals::NATIVE_SCORE), Some(score(&measured)));
    }

    #[test]
    fn short_text_file_is_native() {
        let document =
            Document::from_bytes("note.txt", b"Hello world, this is a note.".to_vec()).unwrap();
        let verdict = Router::default().identify(&document).unwrap();
        assert_eq!(verdict.document_type, DocumentType::Native);
        assert!(verdict.confidence >= 0.5);
        assert_eq!(verdict.signal(signals::TEXT_ONLY_FORMAT), Some(1.0));
        assert!(verdict.signal(signals::NATIVE_SCORE).unwrap() < NATIVE_THRESHOLD);
    }

    #[test]
    fn short_markdown_file_is_native() {
        let document = Document::from_bytes("todo.md", b"# Todo\n\n- milk".to_vec()).unwrap();
        assert!(Router::default().identify(&document).unwrap().is_native());
    }

    #[test]
    fn blank_text_file_stays_scanned() {
        let document = Document::from_bytes("blank.txt", b" \n\t ".to_vec()).unwrap();
        let verdict = Router::default().identify(&document).unwrap();
        assert_eq!(verdict.signal(signals::STRUCTURAL_PROBE_FAILED), Some(1.0));
    }

    #[test]
    fn density_saturates() {
        assert_eq!(text_density(200, 1), 0.5);
        assert_eq!(text_density(5000, 2), 1.0);
        assert_eq!(text_density(10, 0), 0.0);
    }

    #[test]
    fn prose_has_high_quality() {
        let quality = text_quality("The quick brown fox jumps over the lazy dog, twice in 2024.");
        assert!(quality > 0.9, "quality {quality}");
    }

    #[test]
    fn symbol_soup_has_low_quality() {
        let quality = text_quality("~~~~ #@!% ^^^^^ |||| }{}{ ;;;; ''''");
        assert!(quality < 0.3, "quality {quality}");
    }

    #[test]
    fn empty_text_has_zero_quality() {
        assert_eq!(text_quality(" \n\t "), 0.0);
    }

    #[test]
    fn words_and_numbers_are_wordlike() {
        assert!(is_wordlike("(don't)"));
        assert!(is_wordlike("well-known,"));
        assert!(is_wordlike("3.14"));
        assert!(!is_wordlike("a#b$c"));
        assert!(!is_wordlike("%%%"));
    }

    #[test]
    fn runs_are_counted_only_past_their_minimum() {
        assert_eq!(suspicious_run_chars("ab...cd"), 0);
        assert_eq!(suspicious_run_chars("ab.....cd"), 5);
        assert_eq!(suspicious_run_chars(&format!("a{}b", " ".repeat(12))), 12);
    }
}
