// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction engine. Runs the native or scanned path over a document.
//
// The native path reads the structural layer page by page on the calling
// thread. The scanned path rasterizes, preprocesses and recognises each page
// on a bounded worker pool and reassembles the pages by index. Page failures
// become failed `RawPage` entries; only document-level errors leave `extract`
// as `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use vibeparser_core::{
    ClassificationVerdict, DocumentFormat, ExtractionOptions, ExtractionPath, ExtractionStatus,
    PageContent, PreprocessingOptions, RawExtractionResult, RawPage, Result,
    StructuredDocument, VibeError,
};
use vibeparser_document::{
    Document, EmbeddedImageRasterizer, NativeReader, OcrProvider, OcrRequest, PageRasterizer,
    PreprocessingChain, StructuralPage, StructuralReader,
};

use crate::pool::{PagePool, Slot};
use crate::postprocess;
use crate::provider::{ProviderCache, SharedProvider};
use crate::router::Router;

/// Upper bound of the grace period in-flight pages get after the deadline.
pub const MAX_GRACE: Duration = Duration::from_secs(2);

/// Owns the capabilities extraction runs on, and the OCR providers for its
/// whole lifetime.
pub struct Engine {
    reader: Arc<dyn StructuralReader>,
    rasterizer: Arc<dyn PageRasterizer>,
    providers: ProviderCache,
    preprocessing: PreprocessingChain,
    router: Router,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine over the built-in readers, rasterizer and OCR providers.
    pub fn new() -> Self {
        let reader: Arc<dyn StructuralReader> = Arc::new(NativeReader);
        Self {
            router: Router::new(Arc::clone(&reader)),
            reader,
            rasterizer: Arc::new(EmbeddedImageRasterizer),
            providers: ProviderCache::new(),
            preprocessing: PreprocessingChain,
        }
    }

    /// Replace the structural reader, for the router as well.
    pub fn with_reader(mut self, reader: Arc<dyn StructuralReader>) -> Self {
        self.router = Router::new(Arc::clone(&reader));
        self.reader = reader;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Use `provider` for every engine kind.
    pub fn with_provider(self, provider: Arc<dyn OcrProvider>) -> Self {
        self.with_provider_cache(ProviderCache::fixed(provider))
    }

    pub fn with_provider_cache(mut self, providers: ProviderCache) -> Self {
        self.providers = providers;
        self
    }

    pub fn providers(&self) -> &ProviderCache {
        &self.providers
    }

    /// Release the OCR providers. The engine stays usable; providers are
    /// recreated on the next scanned extraction.
    pub fn teardown(&self) {
        self.providers.teardown();
    }

    /// Classify `document` with this engine's structural reader.
    pub fn identify(&self, document: &Document) -> Result<ClassificationVerdict> {
        self.router.identify(document)
    }

    /// Extract the pages of `document`, routing it first unless
    /// `options.do_ocr` forces a path.
    pub fn extract(
        &self,
        document: &Document,
        options: &ExtractionOptions,
    ) -> Result<RawExtractionResult> {
        self.extract_with(document, None, options)
    }

    /// Like [`Engine::extract`], reusing a verdict the caller already has.
    #[instrument(skip_all, fields(document = %document.name(), format = %document.format()))]
    pub fn extract_with(
        &self,
        document: &Document,
        verdict: Option<ClassificationVerdict>,
        options: &ExtractionOptions,
    ) -> Result<RawExtractionResult> {
        options.validate()?;
        let started = Instant::now();

        let verdict = match (options.do_ocr, verdict) {
            (None, None) => Some(self.router.identify(document)?),
            (_, given) => given,
        };
        let path = choose_path(document.format(), options.do_ocr, verdict.as_ref())?;

        let total = document.page_count();
        let mut raw =
            RawExtractionResult::empty(document.id().to_string(), document.format(), path);
        raw.page_count = total;
        raw.verdict = verdict;
        if total == 0 {
            info!(?path, "Document has no pages");
            return Ok(raw);
        }

        let limit = options.max_pages.map_or(total, |max| max.min(total));
        raw.truncated = limit < total;
        let deadline = options.timeout().map(|timeout| started + timeout);
        info!(?path, pages = limit, total, "Extraction started");

        let run = match path {
            ExtractionPath::Native => self.extract_native(document, limit, deadline, options)?,
            ExtractionPath::Scanned => self.extract_scanned(document, limit, deadline, options)?,
        };

        raw.pages = run.pages;
        raw.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        raw.status = settle_status(&raw.pages, run.timed_out, raw.elapsed_ms)?;
        info!(
            ?path,
            extracted = raw.succeeded_pages(),
            failed = raw.pages.len() - raw.succeeded_pages(),
            truncated = raw.truncated,
            elapsed_ms = raw.elapsed_ms,
            "Extraction finished"
        );
        Ok(raw)
    }

    /// Extract, then run the postprocessing chain.
    pub fn extract_and_process(
        &self,
        document: &Document,
        options: &ExtractionOptions,
    ) -> Result<StructuredDocument> {
        let raw = self.extract(document, options)?;
        Ok(postprocess::into_document(raw, &options.postprocessing))
    }

    fn extract_native(
        &self,
        document: &Document,
        limit: usize,
        deadline: Option<Instant>,
        options: &ExtractionOptions,
    ) -> Result<PageRun> {
        let tables = options.tables_active();
        let mut pages = Vec::with_capacity(limit);
        let mut timed_out = false;

        for index in 0..limit {
            if deadline.is_some_and(|at| Instant::now() >= at) {
                warn!(index, "Deadline reached; no further pages issued");
                timed_out = true;
                break;
            }
            let page = match self.reader.read_structural(document, index..index + 1) {
                Ok(read) => match read.into_iter().next() {
                    Some(structural) => RawPage::extracted(index, native_content(structural, tables)),
                    None => RawPage::failed(index, "structural layer returned no page"),
                },
                Err(err) if err.is_document_level() => return Err(err),
                Err(err) => {
                    warn!(index, error = %err, "Page failed");
                    RawPage::failed(index, err.to_string())
                }
            };
            pages.push(page);
        }
        Ok(PageRun { pages, timed_out })
    }

    fn extract_scanned(
        &self,
        document: &Document,
        limit: usize,
        deadline: Option<Instant>,
        options: &ExtractionOptions,
    ) -> Result<PageRun> {
        let provider = self.providers.get(options.engine)?;
        let pool = PagePool::new(options.workers)?;
        let job = ScanJob {
            document: document.clone(),
            rasterizer: Arc::clone(&self.rasterizer),
            chain: self.preprocessing,
            provider,
            request: OcrRequest {
                engine: options.engine,
                language: options.language.clone(),
                want_confidence: !options.fast_mode,
            },
            dpi: options.effective_dpi(),
            preprocessing: options
                .preprocessing_active()
                .then(|| options.preprocessing.clone()),
        };
        info!(
            pages = limit,
            workers = pool.workers(),
            provider = job.provider.name(),
            dpi = job.dpi,
            preprocessing = job.preprocessing.is_some(),
            "Scanned extraction started"
        );

        let indices: Vec<usize> = (0..limit).collect();
        let run = pool.run(&indices, deadline, grace_period(options.timeout()), move |index| {
            job.page(index)
        });

        let mut timed_out = !run.unissued.is_empty();
        if timed_out {
            warn!(skipped = run.unissued.len(), "Deadline reached; pages not issued");
        }
        let mut pages = Vec::with_capacity(run.slots.len());
        for (index, slot) in run.slots {
            let page = match slot {
                Slot::Done(Ok(content)) => RawPage::extracted(index, content),
                Slot::Done(Err(err)) => {
                    warn!(index, error = %err, "Page failed");
                    RawPage::failed(index, err.to_string())
                }
                Slot::Panicked => {
                    warn!(index, "Page worker panicked");
                    RawPage::failed(index, "worker panicked")
                }
                Slot::Unfinished => {
                    timed_out = true;
                    RawPage::failed(index, "timed out")
                }
            };
            pages.push(page);
        }
        Ok(PageRun { pages, timed_out })
    }
}

struct PageRun {
    pages: Vec<RawPage>,
    timed_out: bool,
}

/// Everything one scanned page needs, shared by all workers of a run.
struct ScanJob {
    document: Document,
    rasterizer: Arc<dyn PageRasterizer>,
    chain: PreprocessingChain,
    provider: SharedProvider,
    request: OcrRequest,
    dpi: u32,
    preprocessing: Option<PreprocessingOptions>,
}

impl ScanJob {
    fn page(&self, index: usize) -> Result<PageContent> {
        let raster = self.rasterizer.rasterize(&self.document, index, self.dpi)?;
        let (image, warnings) = match &self.preprocessing {
            Some(options) => {
                let prepared = self.chain.prepare(raster.image, options);
                (prepared.image, prepared.warnings)
            }
            None => (raster.image, Vec::new()),
        };
        let output = self.provider.recognize(&image, &self.request)?;
        debug!(
            index,
            chars = output.text.len(),
            confidence = ?output.confidence,
            "Page recognised"
        );
        Ok(PageContent {
            text: output.text,
            confidence: output.confidence.filter(|_| self.request.want_confidence),
            warnings,
            ..PageContent::default()
        })
    }
}

/// Path for `format` given the caller override and the router verdict.
///
/// An override always wins but must be runnable on the format. Without one,
/// the verdict decides, falling back to the only path the format supports.
pub fn choose_path(
    format: DocumentFormat,
    do_ocr: Option<bool>,
    verdict: Option<&ClassificationVerdict>,
) -> Result<ExtractionPath> {
    match do_ocr {
        Some(true) if !format.is_rasterizable() => Err(VibeError::UnsupportedFormat(format!(
            "{format} documents have no page images to OCR"
        ))),
        Some(true) => Ok(ExtractionPath::Scanned),
        Some(false) if !format.has_text_layer() => Err(VibeError::UnsupportedFormat(format!(
            "{format} documents have no text layer to read"
        ))),
        Some(false) => Ok(ExtractionPath::Native),
        None => {
            let routed = verdict.map_or(ExtractionPath::Scanned, |verdict| {
                ExtractionPath::from(verdict.document_type)
            });
            match routed {
                ExtractionPath::Scanned if !format.is_rasterizable() => {
                    warn!(%format, "Scanned verdict for a format without page images; reading natively");
                    Ok(ExtractionPath::Native)
                }
                ExtractionPath::Native if !format.has_text_layer() => Ok(ExtractionPath::Scanned),
                routed => Ok(routed),
            }
        }
    }
}

/// `min(MAX_GRACE, timeout / 10)`.
pub fn grace_period(timeout: Option<Duration>) -> Duration {
    timeout.map_or(MAX_GRACE, |timeout| (timeout / 10).min(MAX_GRACE))
}

fn settle_status(
    pages: &[RawPage],
    timed_out: bool,
    elapsed_ms: u64,
) -> Result<ExtractionStatus> {
    let failed_pages: Vec<usize> = pages
        .iter()
        .filter(|page| page.is_failed())
        .map(|page| page.page_index)
        .collect();
    let completed_pages = pages.len() - failed_pages.len();

    if timed_out {
        if completed_pages == 0 {
            return Err(VibeError::ExtractionTimeout {
                elapsed_ms,
                completed_pages,
            });
        }
        return Ok(ExtractionStatus::TimedOut {
            completed_pages,
            failed_pages,
        });
    }
    if failed_pages.is_empty() {
        Ok(ExtractionStatus::Complete)
    } else {
        Ok(ExtractionStatus::Partial { failed_pages })
    }
}

/// Page content from the structural layer. Without table extraction, tables
/// are folded into the running text one row per line.
fn native_content(page: StructuralPage, tables: bool) -> PageContent {
    let StructuralPage {
        mut text,
        layout_blocks,
        table_blocks,
        ..
    } = page;
    if tables {
        return PageContent {
            text,
            layout_blocks,
            table_blocks,
            ..PageContent::default()
        };
    }

    for table in table_blocks.iter().filter(|table| !table.is_empty()) {
        let rows: Vec<String> = table
            .rows
            .iter()
            .map(|row| row.join(" ").trim().to_string())
            .filter(|row| !row.is_empty())
            .collect();
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&rows.join("\n"));
    }
    PageContent {
        text,
        layout_blocks,
        ..PageContent::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibeparser_core::{DocumentType, TableBlock};

    fn verdict(document_type: DocumentType) -> ClassificationVerdict {
        ClassificationVerdict {
            document_type,
            confidence: 0.9,
            signals: Default::default(),
        }
    }

    #[test]
    fn overrides_beat_the_verdict() {
        let native = verdict(DocumentType::Native);
        let path = choose_path(DocumentFormat::Pdf, Some(true), Some(&native)).unwrap();
        assert_eq!(path, ExtractionPath::Scanned);

        let scanned = verdict(DocumentType::Scanned);
        let path = choose_path(DocumentFormat::Pdf, Some(false), Some(&scanned)).unwrap();
        assert_eq!(path, ExtractionPath::Native);
    }

    #[test]
    fn impossible_overrides_are_unsupported() {
        assert!(matches!(
            choose_path(DocumentFormat::Markdown, Some(true), None),
            Err(VibeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            choose_path(DocumentFormat::Image, Some(false), None),
            Err(VibeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn verdicts_fall_back_to_the_supported_path() {
        let scanned = verdict(DocumentType::Scanned);
        let path = choose_path(DocumentFormat::Docx, None, Some(&scanned)).unwrap();
        assert_eq!(path, ExtractionPath::Native);

        let native = verdict(DocumentType::Native);
        let path = choose_path(DocumentFormat::Image, None, Some(&native)).unwrap();
        assert_eq!(path, ExtractionPath::Scanned);

        let path = choose_path(DocumentFormat::Pdf, None, Some(&scanned)).unwrap();
        assert_eq!(path, ExtractionPath::Scanned);
    }

    #[test]
    fn grace_is_a_tenth_of_the_timeout_capped() {
        assert_eq!(grace_period(Some(Duration::from_secs(5))), Duration::from_millis(500));
        assert_eq!(grace_period(Some(Duration::from_secs(300))), MAX_GRACE);
        assert_eq!(grace_period(None), MAX_GRACE);
    }

    #[test]
    fn status_reflects_failures_and_timeouts() {
        let ok = RawPage::extracted(0, PageContent::default());
        let bad = RawPage::failed(1, "ocr failed");

        assert_eq!(
            settle_status(&[ok.clone()], false, 5).unwrap(),
            ExtractionStatus::Complete
        );
        assert_eq!(
            settle_status(&[ok.clone(), bad.clone()], false, 5).unwrap(),
            ExtractionStatus::Partial { failed_pages: vec![1] }
        );
        assert_eq!(
            settle_status(&[ok, bad.clone()], true, 5).unwrap(),
            ExtractionStatus::TimedOut {
                completed_pages: 1,
                failed_pages: vec![1]
            }
        );
        assert!(matches!(
            settle_status(&[bad], true, 5),
            Err(VibeError::ExtractionTimeout { completed_pages: 0, .. })
        ));
        assert!(matches!(
            settle_status(&[], true, 5),
            Err(VibeError::ExtractionTimeout { .. })
        ));
    }

    #[test]
    fn tables_fold_into_text_when_disabled() {
        let page = StructuralPage {
            page_index: 0,
            text: "Prices".into(),
            layout_blocks: Vec::new(),
            table_blocks: vec![TableBlock::new(vec![
                vec!["Tea".into(), "2.50".into()],
                vec!["".into(), "".into()],
                vec!["Cake".into(), "3.00".into()],
            ])],
        };

        let kept = native_content(page.clone(), true);
        assert_eq!(kept.text, "Prices");
        assert_eq!(kept.table_blocks.len(), 1);

        let folded = native_content(page, false);
        assert_eq!(folded.text, "Prices\n\nTea 2.50\nCake 3.00");
        assert!(folded.table_blocks.is_empty());
    }
}
