// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Postprocessing: raw extraction text to a structured document.

pub mod clean;
pub mod keywords;
pub mod metrics;
pub mod structure;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;
use vibeparser_core::{
    PostprocessingOptions, QualityMetrics, RawExtractionResult, Section, StructureStats,
    StructuredDocument,
};

pub use clean::clean;
pub use keywords::extract_keywords;
pub use metrics::assess_quality;
pub use structure::{split_sentences, structure};

use crate::render;

/// Everything postprocessing derives from a raw result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Processed {
    pub cleaned_text: String,
    pub sections: Vec<Section>,
    pub keywords: BTreeSet<String>,
    pub metrics: QualityMetrics,
    pub stats: StructureStats,
}

/// Run the postprocessing chain over the text of `raw`.
pub fn process(raw: &RawExtractionResult, options: &PostprocessingOptions) -> Processed {
    let cleaned_text = clean(&raw.full_text());
    let sections = structure(&cleaned_text);
    let keywords = extract_keywords(&cleaned_text, options.keyword_count);
    let metrics = assess_quality(raw, &cleaned_text, &sections);
    let stats = structure::stats(&cleaned_text, &sections);

    info!(
        document = %raw.document_id,
        sections = stats.section_count,
        paragraphs = stats.paragraph_count,
        sentences = stats.sentence_count,
        overall = metrics.overall,
        "Postprocessing complete"
    );

    Processed {
        cleaned_text,
        sections,
        keywords,
        metrics,
        stats,
    }
}

/// Wrap `raw` into its final structured form, markdown included. A result
/// with no pages becomes an empty document.
pub fn into_document(raw: RawExtractionResult, options: &PostprocessingOptions) -> StructuredDocument {
    if raw.pages.is_empty() {
        return StructuredDocument::empty(raw);
    }
    let processed = process(&raw, options);
    let mut document = StructuredDocument {
        markdown: String::new(),
        cleaned_text: processed.cleaned_text,
        sections: processed.sections,
        keywords: processed.keywords,
        metrics: processed.metrics,
        stats: processed.stats,
        raw,
    };
    document.markdown = render::to_markdown(&document);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibeparser_core::{DocumentFormat, ExtractionPath, PageContent, RawPage};

    fn raw(texts: &[&str]) -> RawExtractionResult {
        let mut raw =
            RawExtractionResult::empty("doc".into(), DocumentFormat::Pdf, ExtractionPath::Native);
        raw.page_count = texts.len();
        raw.pages = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                RawPage::extracted(
                    index,
                    PageContent {
                        text: (*text).to_string(),
                        ..PageContent::default()
                    },
                )
            })
            .collect();
        raw
    }

    #[test]
    fn pages_flow_through_every_stage() {
        let raw = raw(&[
            "# Annual Report\n\nRevenue grew stro\u{FB03}\n\nThe revenue figures were\nveri-\nfied.",
            "SUMMARY\n\nRevenue rose. Costs fell.",
        ]);
        let processed = process(&raw, &PostprocessingOptions::default());

        assert!(processed.cleaned_text.contains("verified."));
        assert!(processed.cleaned_text.contains("stroffi"));
        let titles: Vec<Option<&str>> = processed
            .sections
            .iter()
            .map(|section| section.title.as_deref())
            .collect();
        assert_eq!(titles, vec![Some("Annual Report"), Some("SUMMARY")]);
        assert!(processed.keywords.contains("revenue"));
        assert_eq!(processed.stats.section_count, 2);
        assert!(processed.metrics.overall > 0.0);
    }

    #[test]
    fn no_pages_gives_an_empty_document() {
        let document = into_document(raw(&[]), &PostprocessingOptions::default());
        assert!(document.is_empty());
        assert!(document.markdown.is_empty());
    }

    #[test]
    fn markdown_is_rendered() {
        let document = into_document(raw(&["## Scope\n\nAll of it."]), &PostprocessingOptions::default());
        assert_eq!(document.markdown, "## Scope\n\nAll of it.\n");
    }
}
