// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for VibeParser.
//
// Only document-level failures are errors. Page-level failures and degraded
// preprocessing are recorded on the extraction result instead.

use thiserror::Error;

/// Top-level error type for all VibeParser operations.
#[derive(Debug, Error)]
pub enum VibeError {
    // -- Document-level (fatal) --
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction timed out after {elapsed_ms} ms with {completed_pages} pages completed")]
    ExtractionTimeout {
        elapsed_ms: u64,
        completed_pages: usize,
    },

    #[error("invalid extraction options: {0}")]
    InvalidOptions(String),

    // -- Page-level causes (absorbed by the engine) --
    #[error("page rasterization failed: {0}")]
    Raster(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("structural text extraction failed: {0}")]
    Structural(String),

    // -- Plumbing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VibeError {
    /// Whether this error aborts a whole document rather than a single page.
    pub fn is_document_level(&self) -> bool {
        matches!(
            self,
            Self::DocumentUnreadable(_)
                | Self::UnsupportedFormat(_)
                | Self::ExtractionTimeout { .. }
                | Self::InvalidOptions(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VibeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_completed_pages() {
        let err = VibeError::ExtractionTimeout {
            elapsed_ms: 1500,
            completed_pages: 0,
        };
        assert_eq!(
            err.to_string(),
            "extraction timed out after 1500 ms with 0 pages completed"
        );
        assert!(err.is_document_level());
    }

    #[test]
    fn page_causes_are_not_document_level() {
        assert!(!VibeError::Ocr("engine crashed".into()).is_document_level());
        assert!(!VibeError::Raster("no image".into()).is_document_level());
        assert!(VibeError::UnsupportedFormat("docx".into()).is_document_level());
    }
}
