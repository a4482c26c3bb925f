// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: load PDFs and inspect pages: embedded text, page
// geometry, and the raster images placed by each page's content stream.

use image::DynamicImage;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument, warn};
use vibeparser_core::{Result, VibeError};

use super::images::decode_image;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Form XObjects nested deeper than this are not searched for images.
const MAX_FORM_DEPTH: usize = 4;

/// Reference chains longer than this are treated as broken.
const MAX_DEREF_HOPS: usize = 8;

/// An image XObject drawn on a page, with its bounding box in page space
/// (PDF points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedImage {
    pub object_id: ObjectId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PlacedImage {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Read-only view of a PDF document.
///
/// Wraps `lopdf::Document` and resolves 0-based page indices to page
/// objects once at load time.
pub struct PdfReader {
    document: Document,
    /// Page object ids in page order.
    page_ids: Vec<ObjectId>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("pages", &self.page_ids.len())
            .finish()
    }
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            VibeError::DocumentUnreadable(format!("failed to parse PDF: {}", err))
        })?;

        if document.is_encrypted() {
            return Err(VibeError::DocumentUnreadable(
                "PDF is encrypted or password-protected".to_string(),
            ));
        }

        // get_pages() is keyed by 1-based page number, already in order.
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!(pages = page_ids.len(), "PDF loaded from bytes");

        Ok(Self { document, page_ids })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.page_ids.get(index).copied().ok_or_else(|| {
            VibeError::Structural(format!(
                "page {} out of range (document has {} pages)",
                index,
                self.page_ids.len()
            ))
        })
    }

    /// Page width and height in points, from the (possibly inherited) MediaBox.
    pub fn page_size(&self, index: usize) -> (f64, f64) {
        let Ok(page_id) = self.page_id(index) else {
            return DEFAULT_PAGE_SIZE;
        };
        let Some(Object::Array(bounds)) = self.inherited(page_id, b"MediaBox") else {
            return DEFAULT_PAGE_SIZE;
        };
        let values: Vec<f64> = bounds
            .iter()
            .filter_map(|o| number(deref(&self.document, o)?))
            .collect();
        if values.len() != 4 {
            return DEFAULT_PAGE_SIZE;
        }
        let width = (values[2] - values[0]).abs();
        let height = (values[3] - values[1]).abs();
        if width < 1.0 || height < 1.0 {
            DEFAULT_PAGE_SIZE
        } else {
            (width, height)
        }
    }

    // -- Text -----------------------------------------------------------------

    /// Embedded text of page `index` (0-based).
    #[instrument(skip(self), fields(index))]
    pub fn page_text(&self, index: usize) -> Result<String> {
        // Validates the index before lopdf silently returns nothing.
        self.page_id(index)?;
        let page_number = index as u32 + 1;
        self.document
            .extract_text(&[page_number])
            .map_err(|err| VibeError::Structural(format!("page {index}: {err}")))
    }

    // -- Images ---------------------------------------------------------------

    /// Raster images drawn by page `index`, in painting order.
    #[instrument(skip(self), fields(index))]
    pub fn placed_images(&self, index: usize) -> Result<Vec<PlacedImage>> {
        let page_id = self.page_id(index)?;
        let content = self
            .document
            .get_page_content(page_id)
            .map_err(|err| VibeError::Structural(format!("page {index} content: {err}")))?;
        let resources = self
            .inherited(page_id, b"Resources")
            .and_then(|o| as_dict(o));

        let mut placed = Vec::new();
        self.walk_content(&content, resources, IDENTITY, 0, &mut placed);
        debug!(images = placed.len(), "Scanned page for images");
        Ok(placed)
    }

    /// Fraction of page `index` covered by placed images, in [0, 1].
    ///
    /// Overlapping images are not de-duplicated; the sum is clamped instead.
    pub fn image_coverage(&self, index: usize) -> f64 {
        let (width, height) = self.page_size(index);
        let page_area = width * height;
        match self.placed_images(index) {
            Ok(images) => {
                let covered: f64 = images.iter().map(PlacedImage::area).sum();
                (covered / page_area).clamp(0.0, 1.0)
            }
            Err(err) => {
                warn!(index, %err, "Cannot measure image coverage");
                0.0
            }
        }
    }

    /// Decode a placed image to pixels.
    pub fn decode(&self, image: &PlacedImage) -> Result<DynamicImage> {
        match self.document.get_object(image.object_id) {
            Ok(Object::Stream(stream)) => decode_image(&self.document, stream),
            Ok(_) => Err(VibeError::Raster("image XObject is not a stream".into())),
            Err(err) => Err(VibeError::Raster(format!("cannot load image XObject: {err}"))),
        }
    }

    // -- Helpers --------------------------------------------------------------

    /// Look `key` up on the page, then on its ancestors in the page tree.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..32 {
            if let Ok(value) = current.get(key) {
                return deref(&self.document, value);
            }
            let parent = match current.get(b"Parent") {
                Ok(Object::Reference(id)) => *id,
                _ => return None,
            };
            current = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    /// Interpret the graphics-state operators of a content stream, recording
    /// every `Do` of an image XObject under the current transformation.
    fn walk_content(
        &self,
        content: &[u8],
        resources: Option<&Dictionary>,
        base: Matrix,
        depth: usize,
        placed: &mut Vec<PlacedImage>,
    ) {
        let operations = match Content::decode(content) {
            Ok(decoded) => decoded.operations,
            Err(err) => {
                warn!(%err, "Undecodable content stream; skipping");
                return;
            }
        };
        let xobjects = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|o| deref(&self.document, o))
            .and_then(as_dict);

        let mut ctm = base;
        let mut stack: Vec<Matrix> = Vec::new();
        for op in &operations {
            match op.operator.as_str() {
                "q" => stack.push(ctm),
                "Q" => ctm = stack.pop().unwrap_or(base),
                "cm" => {
                    let values: Vec<f64> = op.operands.iter().filter_map(number).collect();
                    if values.len() == 6 {
                        let m = [values[0], values[1], values[2], values[3], values[4], values[5]];
                        ctm = concat(m, ctm);
                    }
                }
                "Do" => {
                    let Some(Object::Name(name)) = op.operands.first() else {
                        continue;
                    };
                    let Some(Object::Reference(id)) = xobjects.and_then(|x| x.get(name).ok())
                    else {
                        continue;
                    };
                    let Ok(Object::Stream(stream)) = self.document.get_object(*id) else {
                        continue;
                    };
                    match stream.dict.get(b"Subtype") {
                        Ok(Object::Name(subtype)) if subtype == b"Image" => {
                            placed.push(place_unit_square(*id, ctm));
                        }
                        Ok(Object::Name(subtype)) if subtype == b"Form" && depth < MAX_FORM_DEPTH => {
                            let form_matrix = stream
                                .dict
                                .get(b"Matrix")
                                .ok()
                                .and_then(|o| match deref(&self.document, o) {
                                    Some(Object::Array(values)) => {
                                        let v: Vec<f64> = values.iter().filter_map(number).collect();
                                        (v.len() == 6).then(|| [v[0], v[1], v[2], v[3], v[4], v[5]])
                                    }
                                    _ => None,
                                })
                                .unwrap_or(IDENTITY);
                            let form_resources = stream
                                .dict
                                .get(b"Resources")
                                .ok()
                                .and_then(|o| deref(&self.document, o))
                                .and_then(as_dict)
                                .or(resources);
                            let body = stream
                                .decompressed_content()
                                .unwrap_or_else(|_| stream.content.clone());
                            self.walk_content(
                                &body,
                                form_resources,
                                concat(form_matrix, ctm),
                                depth + 1,
                                placed,
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }
}

// -- Geometry -----------------------------------------------------------------

/// Affine matrix `[a b c d e f]` as in the PDF `cm` operator.
type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m × ctm`: apply `m` first, then the current transformation.
fn concat(m: Matrix, ctm: Matrix) -> Matrix {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

/// Images are painted into the unit square; its image under `ctm` is the
/// placement. Rotated placements are reduced to their bounding box.
fn place_unit_square(object_id: ObjectId, ctm: Matrix) -> PlacedImage {
    let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(u, v)| {
        (
            ctm[0] * u + ctm[2] * v + ctm[4],
            ctm[1] * u + ctm[3] * v + ctm[5],
        )
    });
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
    PlacedImage {
        object_id,
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

// -- Object helpers -----------------------------------------------------------

/// Follow references until a direct object is reached.
pub(crate) fn deref<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_DEREF_HOPS {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Numeric value of an Integer or Real object.
pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn as_dict(object: &Object) -> Option<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}
