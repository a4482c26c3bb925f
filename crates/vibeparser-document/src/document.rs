// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document handle: source bytes identified by hash, detected format, and the
// parsed body every reader and rasterizer works from.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use vibeparser_core::{DocumentFormat, Result, VibeError};

use crate::detect::detect_format;
use crate::image::ImageProcessor;
use crate::pdf::PdfReader;
use crate::structural::{StructuralPage, markup, office};

/// An immutable, loaded document.
///
/// Cloning is cheap: the parsed body is shared, so one `Document` can be
/// handed to the router, the engine and worker threads at once.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    id: String,
    name: String,
    format: DocumentFormat,
    byte_len: usize,
    body: DocumentBody,
}

/// Parsed representation, chosen per format at load time.
pub(crate) enum DocumentBody {
    /// Paged lazily: text and images are read per page on demand.
    Pdf(PdfReader),
    /// Formats whose structure is fully parsed when loading.
    Parsed(Vec<StructuralPage>),
    /// A single raster page.
    Image(DynamicImage),
}

impl Document {
    /// Load a document from disk. The file name drives extension fallback
    /// during format detection.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            VibeError::DocumentUnreadable(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_bytes(path.display().to_string(), data)
    }

    /// Load a document from memory. `name` is used for logging and, when
    /// the content itself is ambiguous, its extension picks the format.
    #[instrument(skip(name, data), fields(name = %name.as_ref(), bytes = data.len()))]
    pub fn from_bytes(name: impl AsRef<str>, data: Vec<u8>) -> Result<Self> {
        let name = name.as_ref().to_string();
        let format = detect_format(&data, Some(&name)).ok_or_else(|| {
            VibeError::UnsupportedFormat(format!("cannot determine the format of {name}"))
        })?;
        let id = hex::encode(Sha256::digest(&data));
        let byte_len = data.len();
        let body = parse_body(format, data)?;

        let document = Self {
            inner: Arc::new(DocumentInner {
                id,
                name,
                format,
                byte_len,
                body,
            }),
        };
        info!(
            format = %document.format(),
            pages = document.page_count(),
            "Document loaded"
        );
        Ok(document)
    }

    /// SHA-256 of the source bytes, hex encoded.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Source path or caller-supplied name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn format(&self) -> DocumentFormat {
        self.inner.format
    }

    pub fn byte_len(&self) -> usize {
        self.inner.byte_len
    }

    pub fn page_count(&self) -> usize {
        match &self.inner.body {
            DocumentBody::Pdf(reader) => reader.page_count(),
            DocumentBody::Parsed(pages) => pages.len(),
            DocumentBody::Image(_) => 1,
        }
    }

    /// Fraction of page `index` covered by raster images, in [0, 1].
    ///
    /// Image documents are fully covered; text-based formats never are.
    pub fn image_coverage(&self, index: usize) -> f64 {
        match &self.inner.body {
            DocumentBody::Pdf(reader) => reader.image_coverage(index),
            DocumentBody::Image(_) => 1.0,
            DocumentBody::Parsed(_) => 0.0,
        }
    }

    pub(crate) fn body(&self) -> &DocumentBody {
        &self.inner.body
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.inner.name)
            .field("format", &self.inner.format)
            .field("id", &self.inner.id)
            .field("bytes", &self.inner.byte_len)
            .finish()
    }
}

fn parse_body(format: DocumentFormat, data: Vec<u8>) -> Result<DocumentBody> {
    let body = match format {
        DocumentFormat::Pdf => DocumentBody::Pdf(PdfReader::from_bytes(&data)?),
        DocumentFormat::Image => {
            let processor = ImageProcessor::from_bytes(&data)
                .map_err(|err| VibeError::DocumentUnreadable(err.to_string()))?;
            DocumentBody::Image(processor.into_dynamic())
        }
        DocumentFormat::Docx => DocumentBody::Parsed(office::read_docx(&data)?),
        DocumentFormat::Pptx => DocumentBody::Parsed(office::read_pptx(&data)?),
        DocumentFormat::Xlsx => DocumentBody::Parsed(office::read_xlsx(&data)?),
        DocumentFormat::Html => DocumentBody::Parsed(markup::read_html(&decode_text(&data))),
        DocumentFormat::Markdown => {
            DocumentBody::Parsed(markup::read_markdown(&decode_text(&data)))
        }
        DocumentFormat::PlainText => {
            DocumentBody::Parsed(markup::read_plain_text(&decode_text(&data)))
        }
        DocumentFormat::Csv => DocumentBody::Parsed(markup::read_csv(&decode_text(&data))),
    };
    Ok(body)
}

/// Text formats are read as UTF-8; invalid sequences are replaced.
fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(err) => {
            warn!(offset = err.valid_up_to(), "Text is not valid UTF-8; replacing invalid bytes");
            String::from_utf8_lossy(data).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_document() {
        let doc = Document::from_bytes("notes.txt", b"Hello world\x0cSecond page".to_vec()).unwrap();
        assert_eq!(doc.format(), DocumentFormat::PlainText);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.id().len(), 64);
        assert_eq!(doc.image_coverage(0), 0.0);
    }

    #[test]
    fn identical_bytes_share_an_id() {
        let a = Document::from_bytes("a.md", b"# Same".to_vec()).unwrap();
        let b = Document::from_bytes("b.md", b"# Same".to_vec()).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn undetectable_bytes_are_unsupported() {
        let err = Document::from_bytes("blob", vec![0xff, 0xfe, 0x00, 0x81]).unwrap_err();
        assert!(matches!(err, VibeError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let err = Document::from_bytes("broken.pdf", b"not a pdf at all".to_vec()).unwrap_err();
        assert!(matches!(err, VibeError::DocumentUnreadable(_)));
    }

    #[test]
    fn truncated_png_is_unreadable() {
        let err = Document::from_bytes("scan.png", b"\x89PNG\r\n\x1a\n\0\0".to_vec()).unwrap_err();
        assert!(matches!(err, VibeError::DocumentUnreadable(_)));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = Document::open("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, VibeError::DocumentUnreadable(_)));
    }
}
