// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vibeparser-document: Document access for the VibeParser extraction engine.
//
// Loads documents and detects their format, reads structural text (PDF, OOXML,
// HTML, Markdown, plain text, CSV), rasterizes pages, and provides the image
// preprocessing chain and OCR providers used by the scanned path.

pub mod detect;
pub mod document;
pub mod image;
pub mod pdf;
pub mod raster;
pub mod scan;
pub mod structural;

// Re-export the primary types so callers can use `vibeparser_document::Document` etc.
pub use detect::detect_format;
pub use document::Document;
pub use image::processor::ImageProcessor;
pub use pdf::reader::PdfReader;
pub use raster::{EmbeddedImageRasterizer, PageImage, PageRasterizer};
pub use scan::ocr::{OcrOutput, OcrProvider, OcrRequest, TesseractProvider, create_provider};
pub use scan::preprocess::{Prepared, PreprocessingChain};
pub use structural::{NativeReader, StructuralPage, StructuralReader};

#[cfg(feature = "ocr")]
pub use scan::ocrs::OcrsProvider;
