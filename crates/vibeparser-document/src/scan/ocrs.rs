// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pure-Rust OCR provider backed by `ocrs` neural models executed via `rten`.
//
// Only compiled with the `ocr` feature. Two model files are required:
//
// - `text-detection.rten` locates text regions.
// - `text-recognition.rten` decodes characters from detected regions.
//
// Running `ocrs-cli` once downloads both into `$XDG_CACHE_HOME/ocrs`
// (typically `~/.cache/ocrs`), the directory used by default.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};
use vibeparser_core::{Result, VibeError};

use super::ocr::{OcrOutput, OcrProvider, OcrRequest};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Model file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrsModels {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl Default for OcrsModels {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsModels {
    /// Expects `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (role, path) in [("detection", &self.detection), ("recognition", &self.recognition)] {
            if !path.exists() {
                return Err(VibeError::Ocr(format!(
                    "{role} model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// OCR through a loaded ocrs engine. Model loading is the expensive step;
/// construct once and reuse for every page.
pub struct OcrsProvider {
    engine: OcrEngine,
}

impl OcrsProvider {
    #[instrument(skip_all, fields(
        detection = %models.detection.display(),
        recognition = %models.recognition.display(),
    ))]
    pub fn new(models: OcrsModels) -> Result<Self> {
        models.validate()?;

        info!("Loading OCR detection model");
        let detection_model = Model::load_file(&models.detection).map_err(|err| {
            VibeError::Ocr(format!(
                "failed to load detection model from {}: {err}",
                models.detection.display()
            ))
        })?;
        info!("Loading OCR recognition model");
        let recognition_model = Model::load_file(&models.recognition).map_err(|err| {
            VibeError::Ocr(format!(
                "failed to load recognition model from {}: {err}",
                models.recognition.display()
            ))
        })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| VibeError::Ocr(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR engine initialised");
        Ok(Self { engine })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(OcrsModels::default())
    }
}

impl OcrProvider for OcrsProvider {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    /// Model inference already fans out across cores.
    fn is_reentrant(&self) -> bool {
        false
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &DynamicImage, _request: &OcrRequest) -> Result<OcrOutput> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            VibeError::Ocr(format!("failed to create image source ({width}x{height}): {err}"))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| VibeError::Ocr(format!("OCR input preparation failed: {err}")))?;
        let text = self
            .engine
            .get_text(&input)
            .map_err(|err| VibeError::Ocr(format!("OCR text recognition failed: {err}")))?;

        debug!(lines = text.lines().count(), chars = text.len(), "ocrs recognition complete");
        // ocrs reports no per-word confidence through this API.
        Ok(OcrOutput {
            text,
            confidence: None,
        })
    }
}
