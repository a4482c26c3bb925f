// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization: turning one page of a rasterizable document into pixels
// at a requested resolution.
//
// PDF pages are rebuilt from the raster images their content streams place:
// each image is scaled into its placement on a white canvas the size of the
// MediaBox. Vector art and text are not painted, which is sufficient for
// scanned pages (one full-page image each) but not a general PDF renderer.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, instrument, warn};
use vibeparser_core::{Result, VibeError};

use crate::document::{Document, DocumentBody};
use crate::image::ImageProcessor;
use crate::pdf::PdfReader;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f64 = 72.0;

/// Canvases are scaled down so neither side exceeds this many pixels.
pub const MAX_CANVAS_SIDE: u32 = 12_000;

/// A rasterized page, owned by the pipeline step that produced it.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_index: usize,
    pub dpi: u32,
    pub image: DynamicImage,
}

/// Capability: render one page to pixels.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, document: &Document, page_index: usize, dpi: u32) -> Result<PageImage>;
}

/// Rasterizes image documents directly and PDF pages from their embedded
/// images.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRasterizer;

impl PageRasterizer for EmbeddedImageRasterizer {
    #[instrument(skip(self, document), fields(document = %document.name()))]
    fn rasterize(&self, document: &Document, page_index: usize, dpi: u32) -> Result<PageImage> {
        let image = match document.body() {
            DocumentBody::Image(image) if page_index == 0 => image.clone(),
            DocumentBody::Image(_) => {
                return Err(VibeError::Raster(format!(
                    "page {page_index} out of range (image documents have one page)"
                )));
            }
            DocumentBody::Pdf(reader) => compose_pdf_page(reader, page_index, dpi)?,
            DocumentBody::Parsed(_) => {
                return Err(VibeError::UnsupportedFormat(format!(
                    "{} documents cannot be rasterized",
                    document.format()
                )));
            }
        };
        debug!(
            page_index,
            width = image.width(),
            height = image.height(),
            "Page rasterized"
        );
        Ok(PageImage {
            page_index,
            dpi,
            image,
        })
    }
}

/// Paint every decodable placed image of a PDF page onto a page-sized canvas.
fn compose_pdf_page(reader: &PdfReader, index: usize, dpi: u32) -> Result<DynamicImage> {
    let placements = reader
        .placed_images(index)
        .map_err(|err| VibeError::Raster(err.to_string()))?;
    if placements.is_empty() {
        return Err(VibeError::Raster(format!(
            "page {index} has no embedded images to rasterize"
        )));
    }

    let (page_width, page_height) = reader.page_size(index);
    let mut scale = f64::from(dpi) / POINTS_PER_INCH;
    let longest = page_width.max(page_height) * scale;
    if longest > f64::from(MAX_CANVAS_SIDE) {
        scale *= f64::from(MAX_CANVAS_SIDE) / longest;
    }
    let canvas_width = to_pixels(page_width * scale);
    let canvas_height = to_pixels(page_height * scale);
    let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, Rgb([255, 255, 255]));

    let mut painted = 0usize;
    let mut first_error = None;
    for placement in &placements {
        let width = (placement.width * scale).round();
        let height = (placement.height * scale).round();
        if width < 1.0 || height < 1.0 {
            continue;
        }
        let decoded = match reader.decode(placement) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(index, object = ?placement.object_id, %err, "Skipping undecodable image");
                if first_error.is_none() {
                    first_error = Some(err);
                }
                continue;
            }
        };
        let tile = ImageProcessor::from_dynamic(decoded)
            .resize_exact(to_pixels(width), to_pixels(height), FilterType::Triangle)
            .into_dynamic()
            .to_rgb8();
        // PDF space grows upwards from the bottom-left corner.
        let left = (placement.x * scale).round() as i64;
        let top = ((page_height - placement.y - placement.height) * scale).round() as i64;
        imageops::overlay(&mut canvas, &tile, left, top);
        painted += 1;
    }

    if painted == 0 {
        return Err(first_error.unwrap_or_else(|| {
            VibeError::Raster(format!("page {index} has no visible images to rasterize"))
        }));
    }
    Ok(DynamicImage::ImageRgb8(canvas))
}

fn to_pixels(value: f64) -> u32 {
    (value.round() as u32).clamp(1, MAX_CANVAS_SIDE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::image_pdf;

    #[test]
    fn pdf_page_is_composed_at_requested_dpi() {
        let doc = Document::from_bytes("scan.pdf", image_pdf(None)).unwrap();
        let page = EmbeddedImageRasterizer.rasterize(&doc, 0, 72).unwrap();
        assert_eq!((page.image.width(), page.image.height()), (612, 792));

        let rgb = page.image.to_rgb8();
        // The image covers the lower-left quarter; the top stays white.
        assert_eq!(rgb.get_pixel(10, 10), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(100, 700), &Rgb([200, 200, 200]));
    }

    #[test]
    fn dpi_scales_the_canvas() {
        let doc = Document::from_bytes("scan.pdf", image_pdf(None)).unwrap();
        let page = EmbeddedImageRasterizer.rasterize(&doc, 0, 144).unwrap();
        assert_eq!((page.image.width(), page.image.height()), (1224, 1584));
        assert_eq!(page.dpi, 144);
    }

    #[test]
    fn image_documents_have_a_single_page() {
        let png = ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(8, 4)))
            .to_png_bytes()
            .unwrap();
        let doc = Document::from_bytes("page.png", png).unwrap();
        let page = EmbeddedImageRasterizer.rasterize(&doc, 0, 300).unwrap();
        assert_eq!(page.image.width(), 8);
        assert!(EmbeddedImageRasterizer.rasterize(&doc, 1, 300).is_err());
    }

    #[test]
    fn text_formats_cannot_be_rasterized() {
        let doc = Document::from_bytes("notes.md", b"# Heading".to_vec()).unwrap();
        let err = EmbeddedImageRasterizer.rasterize(&doc, 0, 300).unwrap_err();
        assert!(matches!(err, VibeError::UnsupportedFormat(_)));
    }
}
