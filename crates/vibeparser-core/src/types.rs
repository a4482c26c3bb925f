// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: document formats, routing verdicts, raw per-page
// extraction results, and the final structured document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// -- Formats ------------------------------------------------------------------

/// Supported input document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    /// Any raster format the `image` crate decodes (PNG, JPEG, TIFF, GIF, BMP).
    Image,
    Html,
    Markdown,
    PlainText,
    Csv,
}

impl DocumentFormat {
    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Image => "image/*",
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
            Self::PlainText => "text/plain",
            Self::Csv => "text/csv",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "gif" | "bmp" => Some(Self::Image),
            "html" | "htm" | "xhtml" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::PlainText),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Whether the format stores directly extractable character data.
    pub fn has_text_layer(&self) -> bool {
        !matches!(self, Self::Image)
    }

    /// Whether pages of this format can be rendered to an image for OCR.
    pub fn is_rasterizable(&self) -> bool {
        matches!(self, Self::Pdf | Self::Image)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Pptx => "PPTX",
            Self::Xlsx => "XLSX",
            Self::Image => "image",
            Self::Html => "HTML",
            Self::Markdown => "Markdown",
            Self::PlainText => "plain text",
            Self::Csv => "CSV",
        };
        f.write_str(label)
    }
}

// -- Classification -----------------------------------------------------------

/// Whether a document carries usable structural text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Native,
    Scanned,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => f.write_str("NATIVE"),
            Self::Scanned => f.write_str("SCANNED"),
        }
    }
}

/// Names of the signals recorded on a [`ClassificationVerdict`].
pub mod signals {
    pub const STRUCTURAL_PROBE_FAILED: &str = "structural_probe_failed";
    pub const EMPTY_DOCUMENT: &str = "empty_document";
    pub const TEXT_DENSITY: &str = "text_density";
    pub const TEXT_QUALITY: &str = "text_quality";
    pub const IMAGE_COVERAGE: &str = "image_coverage";
    pub const NATIVE_SCORE: &str = "native_score";
    pub const SAMPLED_PAGES: &str = "sampled_pages";
    /// Set when the format has no page images, so any text decides NATIVE.
    pub const TEXT_ONLY_FORMAT: &str = "text_only_format";
}

/// The router's decision for one document.
///
/// `confidence` is the certainty of `document_type`, not the native score:
/// a verdict of SCANNED with confidence 0.9 means "very likely scanned".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub signals: BTreeMap<String, f64>,
}

impl ClassificationVerdict {
    /// Verdict for a document whose structural text probe failed outright.
    pub fn probe_failed() -> Self {
        let mut signals = BTreeMap::new();
        signals.insert(signals::STRUCTURAL_PROBE_FAILED.to_string(), 1.0);
        Self {
            document_type: DocumentType::Scanned,
            confidence: 1.0,
            signals,
        }
    }

    /// Verdict for a document with zero pages.
    pub fn empty_document() -> Self {
        let mut signals = BTreeMap::new();
        signals.insert(signals::EMPTY_DOCUMENT.to_string(), 1.0);
        Self {
            document_type: DocumentType::Scanned,
            confidence: 0.0,
            signals,
        }
    }

    pub fn is_native(&self) -> bool {
        self.document_type == DocumentType::Native
    }

    /// Look up a recorded signal by name.
    pub fn signal(&self, name: &str) -> Option<f64> {
        self.signals.get(name).copied()
    }
}

// -- Raw extraction -----------------------------------------------------------

/// Which pipeline produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractionPath {
    Native,
    Scanned,
}

impl From<DocumentType> for ExtractionPath {
    fn from(value: DocumentType) -> Self {
        match value {
            DocumentType::Native => Self::Native,
            DocumentType::Scanned => Self::Scanned,
        }
    }
}

/// Role of a layout block within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    ListItem,
}

/// A contiguous run of text in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutBlock {
    #[serde(flatten)]
    pub kind: BlockKind,
    pub text: String,
}

impl LayoutBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading {
                level: level.clamp(1, 6),
            },
            text: text.into(),
        }
    }

    pub fn list_item(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::ListItem,
            text: text.into(),
        }
    }
}

/// A table recovered from the structural layer, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBlock {
    pub rows: Vec<Vec<String>>,
}

impl TableBlock {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(|cell| cell.trim().is_empty()))
    }

    /// Widest row, in cells.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Non-fatal conditions recorded against a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum PageWarning {
    /// A preprocessing stage failed and the image passed through unmodified.
    PreprocessingDegraded { stage: String, reason: String },
}

/// Content of a successfully extracted page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layout_blocks: Vec<LayoutBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_blocks: Vec<TableBlock>,
    /// OCR confidence in [0, 1], when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PageWarning>,
}

/// Why a page produced no content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub reason: String,
}

/// Per-page success/error result. A failed page is never an empty success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Extracted(PageContent),
    Failed(PageFailure),
}

/// One page of a [`RawExtractionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// 0-based index in document page order.
    pub page_index: usize,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl RawPage {
    pub fn extracted(page_index: usize, content: PageContent) -> Self {
        Self {
            page_index,
            outcome: PageOutcome::Extracted(content),
        }
    }

    pub fn failed(page_index: usize, reason: impl Into<String>) -> Self {
        Self {
            page_index,
            outcome: PageOutcome::Failed(PageFailure {
                reason: reason.into(),
            }),
        }
    }

    pub fn content(&self) -> Option<&PageContent> {
        match &self.outcome {
            PageOutcome::Extracted(content) => Some(content),
            PageOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PageOutcome::Failed(_))
    }

    /// Extracted text, or the empty string for a failed page.
    pub fn text(&self) -> &str {
        self.content().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Whether a run covered every page it was asked to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Complete,
    /// Some pages failed; the rest are present.
    Partial { failed_pages: Vec<usize> },
    /// The wall-clock bound expired before every page finished.
    TimedOut {
        completed_pages: usize,
        failed_pages: Vec<usize>,
    },
}

impl ExtractionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Ordered per-page output of the extraction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtractionResult {
    /// SHA-256 of the source bytes, hex encoded.
    pub document_id: String,
    pub format: DocumentFormat,
    /// Total pages in the document, including any truncated by `max_pages`.
    pub page_count: usize,
    pub pages: Vec<RawPage>,
    pub path: ExtractionPath,
    pub status: ExtractionStatus,
    /// True when `max_pages` cut the document short.
    pub truncated: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ClassificationVerdict>,
}

impl RawExtractionResult {
    /// Result for a document with no pages.
    pub fn empty(document_id: String, format: DocumentFormat, path: ExtractionPath) -> Self {
        Self {
            document_id,
            format,
            page_count: 0,
            pages: Vec::new(),
            path,
            status: ExtractionStatus::Complete,
            truncated: false,
            elapsed_ms: 0,
            verdict: None,
        }
    }

    pub fn failed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.is_failed())
            .map(|p| p.page_index)
            .collect()
    }

    pub fn succeeded_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_failed()).count()
    }

    /// Text of all extracted pages, in page order, separated by blank lines.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .filter_map(RawPage::content)
            .map(|c| c.text.trim_end())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Mean OCR confidence over pages that report one.
    pub fn mean_confidence(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .pages
            .iter()
            .filter_map(RawPage::content)
            .filter_map(|c| c.confidence)
            .map(f64::from)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

// -- Structured output --------------------------------------------------------

/// Advisory quality signals attached to the final result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Non-whitespace characters over all characters of the cleaned text.
    pub text_density: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_confidence: Option<f64>,
    /// Fraction of raw tokens that look like OCR garbage.
    pub artifact_ratio: f64,
    /// Low values flag likely under-extraction.
    pub completeness_score: f64,
    pub readability: f64,
    pub coherence: f64,
    pub overall: f64,
}

/// An ordered sequence of sentences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Paragraph {
    pub sentences: Vec<String>,
}

impl Paragraph {
    pub fn new(sentences: Vec<String>) -> Self {
        Self { sentences }
    }

    /// Sentences joined back into running text.
    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }
}

/// A titled (or leading, untitled) run of paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Heading depth, 1 for top-level. 0 for the untitled leading section.
    #[serde(default)]
    pub level: u8,
    pub paragraphs: Vec<Paragraph>,
}

/// Counts over the structured content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureStats {
    pub char_count: usize,
    pub paragraph_count: usize,
    pub sentence_count: usize,
    pub section_count: usize,
}

/// Terminal, caller-owned artifact of `extract_and_process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub markdown: String,
    pub cleaned_text: String,
    pub sections: Vec<Section>,
    pub keywords: BTreeSet<String>,
    pub metrics: QualityMetrics,
    pub stats: StructureStats,
    pub raw: RawExtractionResult,
}

impl StructuredDocument {
    /// A result with no content, wrapping the raw result it came from.
    pub fn empty(raw: RawExtractionResult) -> Self {
        Self {
            markdown: String::new(),
            cleaned_text: String::new(),
            sections: Vec::new(),
            keywords: BTreeSet::new(),
            metrics: QualityMetrics::default(),
            stats: StructureStats::default(),
            raw,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.cleaned_text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(pages: Vec<RawPage>) -> RawExtractionResult {
        let mut raw = RawExtractionResult::empty(
            "abc".into(),
            DocumentFormat::Pdf,
            ExtractionPath::Scanned,
        );
        raw.page_count = pages.len();
        raw.pages = pages;
        raw
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("Jpeg"), Some(DocumentFormat::Image));
        assert_eq!(DocumentFormat::from_extension("md"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("exe"), None);
    }

    #[test]
    fn only_pdf_and_images_rasterize() {
        assert!(DocumentFormat::Pdf.is_rasterizable());
        assert!(DocumentFormat::Image.is_rasterizable());
        assert!(!DocumentFormat::Docx.is_rasterizable());
        assert!(!DocumentFormat::Image.has_text_layer());
    }

    #[test]
    fn failed_page_has_empty_text_but_is_flagged() {
        let page = RawPage::failed(3, "ocr provider crashed");
        assert_eq!(page.text(), "");
        assert!(page.is_failed());
        assert!(page.content().is_none());
    }

    #[test]
    fn full_text_skips_failed_pages() {
        let raw = result_with(vec![
            RawPage::extracted(
                0,
                PageContent {
                    text: "first page".into(),
                    ..Default::default()
                },
            ),
            RawPage::failed(1, "boom"),
            RawPage::extracted(
                2,
                PageContent {
                    text: "third page\n".into(),
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(raw.full_text(), "first page\n\nthird page");
        assert_eq!(raw.failed_pages(), vec![1]);
        assert_eq!(raw.succeeded_pages(), 2);
    }

    #[test]
    fn mean_confidence_ignores_pages_without_one() {
        let raw = result_with(vec![
            RawPage::extracted(
                0,
                PageContent {
                    confidence: Some(0.5),
                    ..Default::default()
                },
            ),
            RawPage::extracted(1, PageContent::default()),
            RawPage::extracted(
                2,
                PageContent {
                    confidence: Some(1.0),
                    ..Default::default()
                },
            ),
        ]);
        let mean = raw.mean_confidence().expect("two pages carry confidence");
        assert!((mean - 0.75).abs() < 1e-9);
    }

    #[test]
    fn page_outcome_serializes_with_status_tag() {
        let page = RawPage::failed(0, "timed out");
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timed out");
        assert_eq!(json["page_index"], 0);

        let back: RawPage = serde_json::from_value(json).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn verdict_constructors() {
        let failed = ClassificationVerdict::probe_failed();
        assert_eq!(failed.document_type, DocumentType::Scanned);
        assert_eq!(failed.confidence, 1.0);
        assert_eq!(failed.signal(signals::STRUCTURAL_PROBE_FAILED), Some(1.0));

        let empty = ClassificationVerdict::empty_document();
        assert_eq!(empty.confidence, 0.0);
        assert!(!empty.is_native());
    }
}
