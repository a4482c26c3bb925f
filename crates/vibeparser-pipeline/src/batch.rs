// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch driver over independent documents.
//
// Documents share nothing but the engine's OCR providers, so they run in
// parallel on the rayon global pool. The batch owns the engine and tears its
// providers down when finished.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, instrument, warn};
use vibeparser_core::{ExtractionOptions, Result, StructuredDocument};
use vibeparser_document::Document;

use crate::engine::Engine;

/// Outcome for one input of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub source: PathBuf,
    pub result: Result<StructuredDocument>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct BatchExtractor {
    engine: Engine,
}

impl Default for BatchExtractor {
    fn default() -> Self {
        Self::new(Engine::new())
    }
}

impl BatchExtractor {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Load and process every path. Results come back in input order; a
    /// document that fails does not affect the others.
    #[instrument(skip_all, fields(documents = paths.len()))]
    pub fn run(&self, paths: &[PathBuf], options: &ExtractionOptions) -> Vec<BatchItem> {
        let items: Vec<BatchItem> = paths
            .par_iter()
            .map(|path| BatchItem {
                source: path.clone(),
                result: Document::open(path)
                    .and_then(|document| self.engine.extract_and_process(&document, options)),
            })
            .collect();
        log_summary(&items);
        items
    }

    /// Process documents already in memory, in input order.
    pub fn run_documents(
        &self,
        documents: &[Document],
        options: &ExtractionOptions,
    ) -> Vec<Result<StructuredDocument>> {
        documents
            .par_iter()
            .map(|document| self.engine.extract_and_process(document, options))
            .collect()
    }

    /// End the batch and release the OCR providers.
    pub fn finish(self) {
        self.engine.teardown();
    }
}

fn log_summary(items: &[BatchItem]) {
    let mut failed = 0usize;
    for item in items {
        if let Err(err) = &item.result {
            failed += 1;
            warn!(source = %item.source.display(), error = %err, "Document failed");
        }
    }
    info!(documents = items.len(), failed, "Batch finished");
}
