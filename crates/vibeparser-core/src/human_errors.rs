// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the command-line surface.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Severity drives the exit code and how loudly the CLI reports the problem.

use crate::error::VibeError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Slow machine or busy disk; running again may succeed.
    Transient,
    /// User must do something (install a tool, fix a setting, unlock a file).
    ActionRequired,
    /// Cannot be fixed by retrying; wrong format, damaged file.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether running the same command again could help.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `VibeError` into a `HumanError`.
pub fn humanize_error(err: &VibeError) -> HumanError {
    match err {
        VibeError::DocumentUnreadable(detail) => {
            let lower = detail.to_lowercase();
            if lower.contains("encrypt") || lower.contains("password") {
                HumanError {
                    message: "This document is password protected.".into(),
                    suggestion: "Remove the password (for example by printing it to a new PDF), then try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "This file could not be opened.".into(),
                    suggestion: format!("The file may be damaged or only partly downloaded. ({detail})"),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            }
        }

        VibeError::UnsupportedFormat(detail) => HumanError {
            message: "This type of document isn't supported for that operation.".into(),
            suggestion: format!(
                "Supported inputs are PDF, DOCX, PPTX, XLSX, images, HTML, Markdown, text and CSV. OCR only applies to PDFs and images. ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        VibeError::ExtractionTimeout { elapsed_ms, .. } => HumanError {
            message: "Extraction took too long and no page finished.".into(),
            suggestion: format!(
                "Try --fast, a lower --dpi, --max-pages, or a larger timeout. (Stopped after {} s)",
                elapsed_ms / 1000
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        VibeError::InvalidOptions(detail) => HumanError {
            message: "One of the settings is not valid.".into(),
            suggestion: format!("Check the command-line flags or the config file. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        VibeError::Ocr(detail) => humanize_ocr_error(detail),

        VibeError::Raster(detail) | VibeError::Image(detail) => HumanError {
            message: "A page image could not be prepared for text recognition.".into(),
            suggestion: format!("The page may use an image encoding we can't decode. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        VibeError::Structural(detail) => HumanError {
            message: "The text inside this document could not be read.".into(),
            suggestion: format!("Try forcing OCR with --force-ocr. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        VibeError::Io(io_err) => HumanError {
            message: "A file could not be read or written.".into(),
            suggestion: format!("Check that the path exists and you have permission to use it. ({io_err})"),
            retriable: true,
            severity: Severity::Transient,
        },

        VibeError::Serialization(detail) => HumanError {
            message: "Settings or output could not be converted.".into(),
            suggestion: format!("If you passed a config file, check that it is valid JSON. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

fn humanize_ocr_error(detail: &str) -> HumanError {
    let lower = detail.to_lowercase();
    if lower.contains("not found") && lower.contains("tesseract") {
        HumanError {
            message: "The Tesseract OCR program is not installed.".into(),
            suggestion: "Install it (for example `apt install tesseract-ocr`) or choose --engine ocrs.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("model") {
        HumanError {
            message: "The OCR models are missing.".into(),
            suggestion: "Run `ocrs-cli` once to download models to ~/.cache/ocrs, or choose --engine tesseract.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("feature") {
        HumanError {
            message: "This build does not include that OCR engine.".into(),
            suggestion: "Rebuild with `--features ocr` or choose --engine tesseract.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: "Text recognition failed.".into(),
            suggestion: format!("Try again with a different --engine or --dpi. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_document_is_action_required() {
        let err = VibeError::DocumentUnreadable("document is encrypted".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn corrupt_document_is_permanent() {
        let err = VibeError::DocumentUnreadable("invalid xref table".into());
        assert_eq!(humanize_error(&err).severity, Severity::Permanent);
    }

    #[test]
    fn timeout_is_transient() {
        let err = VibeError::ExtractionTimeout {
            elapsed_ms: 301_000,
            completed_pages: 0,
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.suggestion.contains("301 s"));
    }

    #[test]
    fn missing_tesseract_is_action_required() {
        let err = VibeError::Ocr("tesseract not found (install tesseract-ocr)".into());
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }

    #[test]
    fn unsupported_format_is_permanent() {
        let err = VibeError::UnsupportedFormat("OCR requested for DOCX".into());
        assert_eq!(humanize_error(&err).severity, Severity::Permanent);
    }
}
