// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vibeparser-pipeline: Routing, extraction and postprocessing.
//
// The router classifies a document as NATIVE or SCANNED, the engine runs the
// matching extraction path, and the postprocessing chain turns the raw page
// text into a scored, structured document. Surrounding interfaces only need
// the two entry points below.

pub mod batch;
pub mod engine;
pub mod pool;
pub mod postprocess;
pub mod provider;
pub mod render;
pub mod router;

pub use batch::{BatchExtractor, BatchItem};
pub use engine::Engine;
pub use pool::PagePool;
pub use provider::{ProviderCache, SharedProvider};
pub use router::{Router, RouterSignals};

use vibeparser_core::{ClassificationVerdict, ExtractionOptions, Result, StructuredDocument};
use vibeparser_document::Document;

/// Classify `document` as NATIVE or SCANNED from its structural text layer.
pub fn identify_type(document: &Document) -> Result<ClassificationVerdict> {
    Router::default().identify(document)
}

/// Route, extract and postprocess `document` in one call.
///
/// A fresh engine is used; long-running callers that process many documents
/// should hold an [`Engine`] (or a [`BatchExtractor`]) instead so the OCR
/// provider is initialised once.
pub fn extract_and_process(
    document: &Document,
    options: &ExtractionOptions,
) -> Result<StructuredDocument> {
    let engine = Engine::new();
    let result = engine.extract_and_process(document, options);
    engine.teardown();
    result
}
