// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR capability: the narrow interface the extraction engine calls, plus the
// tesseract command-line provider.
//
// The tesseract provider shells out once per page: the page is written to a
// temporary PNG, recognised with `tesseract <png> stdout`, and the temporary
// file is removed when the call returns.

use std::io::Write;
use std::process::Command;
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, info, instrument};
use vibeparser_core::{OcrEngineKind, Result, VibeError};

use crate::image::ImageProcessor;

/// Parameters of one recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    pub engine: OcrEngineKind,
    /// ISO 639-1 (`en`), tesseract (`eng`), or `+`-joined combinations.
    pub language: String,
    /// Whether the caller wants a confidence value. Providers may skip the
    /// extra work when false.
    pub want_confidence: bool,
}

/// Text recognised on one page image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence in [0, 1].
    pub confidence: Option<f32>,
}

/// Capability: recognise text in a page image.
pub trait OcrProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &DynamicImage, request: &OcrRequest) -> Result<OcrOutput>;

    /// Whether concurrent `recognize` calls are safe. Callers serialise calls
    /// to providers that return false.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Construct the provider for `kind`.
///
/// `Auto` picks ocrs when compiled with the `ocr` feature and tesseract
/// otherwise. Construction fails when the backend is unavailable.
pub fn create_provider(kind: OcrEngineKind) -> Result<Arc<dyn OcrProvider>> {
    match kind {
        OcrEngineKind::Tesseract => Ok(Arc::new(TesseractProvider::new()?)),
        #[cfg(feature = "ocr")]
        OcrEngineKind::Auto | OcrEngineKind::Ocrs => {
            Ok(Arc::new(super::ocrs::OcrsProvider::with_defaults()?))
        }
        #[cfg(not(feature = "ocr"))]
        OcrEngineKind::Auto => Ok(Arc::new(TesseractProvider::new()?)),
        #[cfg(not(feature = "ocr"))]
        OcrEngineKind::Ocrs => Err(VibeError::Ocr(
            "the ocrs engine requires building with the `ocr` feature".into(),
        )),
    }
}

// -- Tesseract ----------------------------------------------------------------

/// Recognition through the `tesseract` binary on `PATH` (or a given path).
#[derive(Debug, Clone)]
pub struct TesseractProvider {
    binary: String,
    version: String,
}

impl TesseractProvider {
    /// Locate `tesseract` on `PATH`.
    pub fn new() -> Result<Self> {
        Self::with_binary("tesseract")
    }

    /// Use a specific tesseract executable.
    #[instrument]
    pub fn with_binary(binary: &str) -> Result<Self> {
        let output = Command::new(binary).arg("--version").output().map_err(|err| {
            VibeError::Ocr(format!("tesseract is not installed or not runnable ({binary}): {err}"))
        })?;
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        let version = banner.lines().next().unwrap_or("tesseract").trim().to_string();
        info!(%version, "Tesseract available");
        Ok(Self {
            binary: binary.to_string(),
            version,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl OcrProvider for TesseractProvider {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height(), language = %request.language))]
    fn recognize(&self, image: &DynamicImage, request: &OcrRequest) -> Result<OcrOutput> {
        let png = ImageProcessor::from_dynamic(image.clone()).to_png_bytes()?;
        let mut input = tempfile::Builder::new()
            .prefix("vibeparser-page-")
            .suffix(".png")
            .tempfile()?;
        input.write_all(&png)?;
        input.flush()?;

        let language = tesseract_language(&request.language);
        let mut command = Command::new(&self.binary);
        command.arg(input.path()).arg("stdout").arg("-l").arg(&language);
        if request.want_confidence {
            command.arg("tsv");
        }
        let output = command
            .output()
            .map_err(|err| VibeError::Ocr(format!("failed to run tesseract: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VibeError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = if request.want_confidence {
            parse_tsv(&stdout)
        } else {
            OcrOutput {
                text: stdout.trim_end().to_string(),
                confidence: None,
            }
        };
        debug!(
            chars = result.text.len(),
            confidence = ?result.confidence,
            "Tesseract recognition complete"
        );
        Ok(result)
    }
}

/// Map ISO 639-1 codes to tesseract's traineddata names. Unknown or already
/// three-letter codes pass through.
pub fn tesseract_language(code: &str) -> String {
    code.split('+')
        .map(|part| {
            let part = part.trim();
            let lower = part.to_ascii_lowercase();
            let mapped = match lower.as_str() {
                "en" => "eng",
                "de" => "deu",
                "fr" => "fra",
                "es" => "spa",
                "it" => "ita",
                "pt" => "por",
                "nl" => "nld",
                "sv" => "swe",
                "da" => "dan",
                "no" | "nb" => "nor",
                "fi" => "fin",
                "pl" => "pol",
                "cs" => "ces",
                "hu" => "hun",
                "tr" => "tur",
                "el" => "ell",
                "ru" => "rus",
                "uk" => "ukr",
                "ar" => "ara",
                "he" => "heb",
                "hi" => "hin",
                "zh" | "zh-cn" => "chi_sim",
                "zh-tw" => "chi_tra",
                "ja" => "jpn",
                "ko" => "kor",
                _ => part,
            };
            mapped.to_string()
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Rebuild text and mean confidence from tesseract's TSV output.
///
/// Words are joined by spaces, lines by newlines, paragraphs and blocks by
/// blank lines.
fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut last: Option<(u32, u32, u32)> = None;

    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let word = columns[11].trim();
        let Ok(conf) = columns[10].parse::<f32>() else {
            continue;
        };
        if word.is_empty() || conf < 0.0 {
            continue;
        }
        let number = |i: usize| columns[i].parse::<u32>().unwrap_or(0);
        let position = (number(2), number(3), number(4));

        match last {
            None => {}
            Some((block, par, _)) if (block, par) != (position.0, position.1) => {
                text.push_str("\n\n")
            }
            Some(previous) if previous != position => text.push('\n'),
            Some(_) => text.push(' '),
        }
        text.push_str(word);
        confidences.push(conf);
        last = Some(position);
    }

    let confidence = if confidences.is_empty() {
        None
    } else {
        let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
        Some((mean / 100.0).clamp(0.0, 1.0))
    };
    OcrOutput { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t96.5\tHello
5\t1\t1\t1\t1\t2\t70\t10\t50\t20\t90.5\tworld
5\t1\t1\t1\t2\t1\t10\t40\t50\t20\t80\tnext
5\t1\t2\t1\t1\t1\t10\t90\t50\t20\t73\tBlock
5\t1\t2\t1\t1\t2\t70\t90\t50\t20\t-1\t
";

    #[test]
    fn tsv_rebuilds_lines_and_blocks() {
        let output = parse_tsv(TSV);
        assert_eq!(output.text, "Hello world\nnext\n\nBlock");
        let confidence = output.confidence.unwrap();
        assert!((confidence - 0.85).abs() < 1e-4, "confidence {confidence}");
    }

    #[test]
    fn empty_tsv_has_no_confidence() {
        let output = parse_tsv("level\tpage_num\n");
        assert!(output.text.is_empty());
        assert_eq!(output.confidence, None);
    }

    #[test]
    fn languages_map_to_traineddata_names() {
        assert_eq!(tesseract_language("en"), "eng");
        assert_eq!(tesseract_language("de+EN"), "deu+eng");
        assert_eq!(tesseract_language("chi_sim"), "chi_sim");
        assert_eq!(tesseract_language("zh-TW"), "chi_tra");
    }

    #[test]
    fn missing_binary_is_an_ocr_error() {
        let err = TesseractProvider::with_binary("/nonexistent/tesseract-binary").unwrap_err();
        assert!(matches!(err, VibeError::Ocr(_)));
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn ocrs_requires_the_feature() {
        assert!(matches!(create_provider(OcrEngineKind::Ocrs), Err(VibeError::Ocr(_))));
    }
}
