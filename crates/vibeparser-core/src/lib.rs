// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VibeParser: Core types, extraction options and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use config::{
    BinarizeMethod, ExtractionOptions, OcrEngineKind, PostprocessingOptions, PreprocessingOptions,
};
pub use error::{Result, VibeError};
pub use types::*;
