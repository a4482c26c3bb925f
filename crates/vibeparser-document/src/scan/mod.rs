// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanned-page pipeline: image preprocessing and optical character
// recognition (OCR) providers.

pub mod ocr;
pub mod preprocess;

#[cfg(feature = "ocr")]
pub mod ocrs;

pub use ocr::{OcrOutput, OcrProvider, OcrRequest, TesseractProvider, create_provider};
pub use preprocess::{Prepared, PreprocessingChain, Stage};

#[cfg(feature = "ocr")]
pub use ocrs::OcrsProvider;
