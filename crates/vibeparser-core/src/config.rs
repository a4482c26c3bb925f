// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction options.
//
// The engine treats `ExtractionOptions` as an immutable snapshot: it is
// validated once at the start of a run and never mutated afterwards.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VibeError};

/// DPI used when `fast_mode` is on, regardless of the configured value.
pub const FAST_MODE_MAX_DPI: u32 = 150;

/// OCR backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngineKind {
    /// ocrs when compiled with the `ocr` feature, tesseract otherwise.
    #[default]
    #[serde(alias = "default")]
    Auto,
    Tesseract,
    Ocrs,
}

impl std::fmt::Display for OcrEngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Tesseract => f.write_str("tesseract"),
            Self::Ocrs => f.write_str("ocrs"),
        }
    }
}

impl std::str::FromStr for OcrEngineKind {
    type Err = VibeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "default" => Ok(Self::Auto),
            "tesseract" => Ok(Self::Tesseract),
            "ocrs" => Ok(Self::Ocrs),
            other => Err(VibeError::InvalidOptions(format!("unknown OCR engine `{other}`"))),
        }
    }
}

/// Thresholding strategy for the binarize stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinarizeMethod {
    /// Local-mean threshold over a square neighbourhood.
    #[default]
    Adaptive,
    /// Single global threshold from the histogram.
    Otsu,
}

/// Toggles for the image preprocessing chain. Disabled stages are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingOptions {
    /// Master switch; when false the chain returns its input untouched.
    pub enabled: bool,
    pub denoise: bool,
    /// Median filter radius, 1..=5.
    pub denoise_strength: u32,
    pub contrast: bool,
    pub binarize: bool,
    pub binarize_method: BinarizeMethod,
    /// Residual speckle removal after binarization.
    pub noise_removal: bool,
    pub normalize_resolution: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            denoise: true,
            denoise_strength: 1,
            contrast: true,
            binarize: true,
            binarize_method: BinarizeMethod::Adaptive,
            noise_removal: true,
            normalize_resolution: true,
        }
    }
}

impl PreprocessingOptions {
    /// All stages off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Options for the text postprocessing chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessingOptions {
    /// Maximum number of keywords to extract.
    pub keyword_count: usize,
}

impl Default for PostprocessingOptions {
    fn default() -> Self {
        Self { keyword_count: 10 }
    }
}

/// Configuration snapshot for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    pub engine: OcrEngineKind,
    /// Rasterization resolution for the scanned path.
    pub dpi: u32,
    /// ISO 639-1 (`en`) or tesseract (`eng`) language code.
    pub language: String,
    /// `Some(true)` forces OCR, `Some(false)` forbids it, `None` follows the router.
    pub do_ocr: Option<bool>,
    /// Trade accuracy for latency: caps DPI, skips preprocessing, tables and
    /// per-page confidence.
    pub fast_mode: bool,
    /// Process at most this many leading pages.
    pub max_pages: Option<usize>,
    pub extract_tables: bool,
    /// Wall-clock bound for the page loop. `None` is unbounded.
    pub timeout_seconds: Option<u64>,
    /// Worker threads for the scanned path. 0 picks a default.
    pub workers: usize,
    pub preprocessing: PreprocessingOptions,
    pub postprocessing: PostprocessingOptions,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::Auto,
            dpi: 200,
            language: "en".to_string(),
            do_ocr: None,
            fast_mode: false,
            max_pages: None,
            extract_tables: true,
            timeout_seconds: Some(300),
            workers: 0,
            preprocessing: PreprocessingOptions::default(),
            postprocessing: PostprocessingOptions::default(),
        }
    }
}

impl ExtractionOptions {
    /// The fastest profile: no preprocessing, no tables, capped DPI.
    pub fn fast() -> Self {
        Self {
            fast_mode: true,
            ..Self::default()
        }
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&raw)?;
        options.validate()?;
        debug!(path = %path.as_ref().display(), "Loaded extraction options");
        Ok(options)
    }

    /// Load options from `path` if given, falling back to defaults on any error.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) if path.exists() => match Self::from_json_file(path) {
                Ok(options) => options,
                Err(err) => {
                    warn!(path = %path.display(), %err, "Failed to load options; using defaults");
                    Self::default()
                }
            },
            Some(path) => {
                warn!(path = %path.display(), "Options file not found; using defaults");
                Self::default()
            }
            None => Self::default(),
        }
    }

    /// Reject values the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(36..=1200).contains(&self.dpi) {
            return Err(VibeError::InvalidOptions(format!(
                "dpi must be within 36..=1200, got {}",
                self.dpi
            )));
        }
        if self.language.trim().is_empty() {
            return Err(VibeError::InvalidOptions("language must not be empty".into()));
        }
        if self.preprocessing.denoise_strength > 5 {
            return Err(VibeError::InvalidOptions(format!(
                "denoise_strength must be at most 5, got {}",
                self.preprocessing.denoise_strength
            )));
        }
        if self.max_pages == Some(0) {
            return Err(VibeError::InvalidOptions("max_pages must be at least 1".into()));
        }
        Ok(())
    }

    /// DPI actually used for rasterization.
    pub fn effective_dpi(&self) -> u32 {
        if self.fast_mode {
            self.dpi.min(FAST_MODE_MAX_DPI)
        } else {
            self.dpi
        }
    }

    /// Whether the scanned path runs the preprocessing chain.
    pub fn preprocessing_active(&self) -> bool {
        !self.fast_mode && self.preprocessing.enabled
    }

    /// Whether table blocks are kept.
    pub fn tables_active(&self) -> bool {
        self.extract_tables && !self.fast_mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
