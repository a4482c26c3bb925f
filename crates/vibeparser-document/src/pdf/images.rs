// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decoding of PDF image XObjects into `image` buffers.
//
// Covers what scanners and scan-to-PDF tools actually write: JPEG (DCTDecode)
// passed straight to the image crate, and Flate-compressed or raw samples at
// 1 or 8 bits per component in Gray, RGB, CMYK, ICC-based and indexed colour
// spaces. JPEG 2000, CCITT fax and JBIG2 are reported as unsupported.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::debug;
use vibeparser_core::{Result, VibeError};

use super::reader::{deref, number};

/// Largest image, in pixels, decoded from a PDF.
pub const MAX_IMAGE_PIXELS: u64 = 200_000_000;

/// Colour model of decoded samples.
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette lookup into `base`, `palette` holding packed base-space samples.
    Indexed { base: Box<ColorModel>, palette: Vec<u8> },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

/// Decode an image XObject stream.
pub fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage> {
    let dict = &stream.dict;
    let filters = filter_names(doc, dict);

    for unsupported in [&b"JPXDecode"[..], b"CCITTFaxDecode", b"JBIG2Decode"] {
        if filters.iter().any(|f| f.as_slice() == unsupported) {
            return Err(VibeError::Raster(format!(
                "unsupported image encoding {}",
                String::from_utf8_lossy(unsupported)
            )));
        }
    }

    if filters.last().is_some_and(|f| f.as_slice() == b"DCTDecode") {
        let jpeg = if filters.len() == 1 {
            stream.content.clone()
        } else {
            stream
                .decompressed_content()
                .map_err(|err| VibeError::Raster(format!("cannot unwrap JPEG data: {err}")))?
        };
        debug!(bytes = jpeg.len(), "Decoding embedded JPEG");
        return image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|err| VibeError::Raster(format!("embedded JPEG is corrupt: {err}")));
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|err| VibeError::Raster(format!("cannot decompress image samples: {err}")))?
    };

    let width = dimension(doc, dict, b"Width")?;
    let height = dimension(doc, dict, b"Height")?;
    let is_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let bits = if is_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .ok()
            .and_then(|o| number(deref(doc, o)?))
            .map(|b| b as u32)
            .unwrap_or(8)
    };
    let model = if is_mask {
        ColorModel::Gray
    } else {
        color_model(doc, dict.get(b"ColorSpace").ok())?
    };
    // Mask samples of 0 paint black, the same convention as 1-bit gray.
    let inverted = decode_inverted(doc, dict);

    samples_to_image(&samples, width, height, bits, &model, inverted)
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Some(filter) = dict.get(b"Filter").ok().and_then(|o| deref(doc, o)) else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| match deref(doc, item) {
                Some(Object::Name(name)) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn dimension(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<u32> {
    let value = dict
        .get(key)
        .ok()
        .and_then(|o| number(deref(doc, o)?))
        .ok_or_else(|| {
            VibeError::Raster(format!(
                "image is missing /{}",
                String::from_utf8_lossy(key)
            ))
        })?;
    if value < 1.0 {
        return Err(VibeError::Raster("image has zero size".into()));
    }
    Ok(value as u32)
}

fn color_model(doc: &Document, space: Option<&Object>) -> Result<ColorModel> {
    color_space(doc, space, true)
}

/// An indexed space's base may not itself be indexed, so this recurses at
/// most once.
fn color_space(doc: &Document, space: Option<&Object>, allow_indexed: bool) -> Result<ColorModel> {
    let Some(space) = space.and_then(|o| deref(doc, o)) else {
        return Ok(ColorModel::Gray);
    };
    match space {
        Object::Name(name) => named_color_model(name),
        Object::Array(items) => {
            let family = match items.first().and_then(|o| deref(doc, o)) {
                Some(Object::Name(name)) => name.as_slice(),
                _ => return Err(VibeError::Raster("malformed colour space".into())),
            };
            match family {
                b"ICCBased" => {
                    let n = items
                        .get(1)
                        .and_then(|o| deref(doc, o))
                        .and_then(|o| match o {
                            Object::Stream(s) => s.dict.get(b"N").ok().and_then(number),
                            _ => None,
                        })
                        .unwrap_or(3.0) as usize;
                    Ok(match n {
                        1 => ColorModel::Gray,
                        4 => ColorModel::Cmyk,
                        _ => ColorModel::Rgb,
                    })
                }
                b"Indexed" | b"I" if !allow_indexed => Err(VibeError::Raster(
                    "indexed colour space with an indexed base".into(),
                )),
                b"Indexed" | b"I" => {
                    let base = color_space(doc, items.get(1), false)?;
                    let palette = match items.get(3).and_then(|o| deref(doc, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(s)) => s
                            .decompressed_content()
                            .unwrap_or_else(|_| s.content.clone()),
                        _ => return Err(VibeError::Raster("indexed image without palette".into())),
                    };
                    Ok(ColorModel::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                b"CalRGB" | b"Lab" => Ok(ColorModel::Rgb),
                b"CalGray" => Ok(ColorModel::Gray),
                other => Err(VibeError::Raster(format!(
                    "unsupported colour space {}",
                    String::from_utf8_lossy(other)
                ))),
            }
        }
        _ => Err(VibeError::Raster("malformed colour space".into())),
    }
}

fn named_color_model(name: &[u8]) -> Result<ColorModel> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => Err(VibeError::Raster(format!(
            "unsupported colour space {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// A `/Decode [1 0]` array flips sample values.
fn decode_inverted(doc: &Document, dict: &Dictionary) -> bool {
    match dict.get(b"Decode").ok().and_then(|o| deref(doc, o)) {
        Some(Object::Array(values)) => values
            .first()
            .and_then(number)
            .is_some_and(|first| first > 0.5),
        _ => false,
    }
}

/// Unpack sample rows into an 8-bit image.
fn samples_to_image(
    samples: &[u8],
    width: u32,
    height: u32,
    bits: u32,
    model: &ColorModel,
    inverted: bool,
) -> Result<DynamicImage> {
    if bits != 1 && bits != 8 {
        return Err(VibeError::Raster(format!(
            "unsupported sample depth of {bits} bits"
        )));
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_IMAGE_PIXELS {
        return Err(VibeError::Raster(format!(
            "image of {width}x{height} exceeds {MAX_IMAGE_PIXELS} pixels"
        )));
    }
    let components = model.components();
    let (w, h) = (width as usize, height as usize);
    let too_large = || VibeError::Raster(format!("image of {width}x{height} is too large"));
    let row_bytes = w
        .checked_mul(components * bits as usize)
        .ok_or_else(too_large)?
        .div_ceil(8);
    let expected = row_bytes.checked_mul(h).ok_or_else(too_large)?;
    if samples.len() < expected {
        return Err(VibeError::Raster(format!(
            "image data truncated: {} of {expected} bytes",
            samples.len(),
        )));
    }

    // Expand to one byte per component.
    let mut unpacked = Vec::with_capacity(w * h * components);
    for row in samples.chunks(row_bytes).take(h) {
        if bits == 8 {
            unpacked.extend_from_slice(&row[..w * components]);
        } else {
            for i in 0..w * components {
                let bit = (row[i / 8] >> (7 - (i % 8))) & 1;
                unpacked.push(if matches!(model, ColorModel::Indexed { .. }) {
                    bit
                } else {
                    bit * 255
                });
            }
        }
    }
    if inverted && !matches!(model, ColorModel::Indexed { .. }) {
        for value in &mut unpacked {
            *value = 255 - *value;
        }
    }

    let raster_err = || VibeError::Raster("sample buffer does not match image size".into());
    match model {
        ColorModel::Gray => GrayImage::from_raw(width, height, unpacked)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(raster_err),
        ColorModel::Rgb => RgbImage::from_raw(width, height, unpacked)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(raster_err),
        ColorModel::Cmyk => RgbImage::from_raw(width, height, cmyk_to_rgb(&unpacked))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(raster_err),
        ColorModel::Indexed { base, palette } => {
            let rgb = expand_palette(&unpacked, base, palette);
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(raster_err)
        }
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for px in cmyk.chunks_exact(4) {
        let k = 255 - u32::from(px[3]);
        for &ink in &px[..3] {
            rgb.push(((255 - u32::from(ink)) * k / 255) as u8);
        }
    }
    rgb
}

fn expand_palette(indices: &[u8], base: &ColorModel, palette: &[u8]) -> Vec<u8> {
    let stride = base.components();
    let mut rgb = Vec::with_capacity(indices.len() * 3);
    for &index in indices {
        let start = usize::from(index) * stride;
        let entry = palette.get(start..start + stride).unwrap_or(&[]);
        match (base, entry.len()) {
            (ColorModel::Gray, 1) => rgb.extend_from_slice(&[entry[0]; 3]),
            (ColorModel::Cmyk, 4) => rgb.extend(cmyk_to_rgb(entry)),
            (_, 3) => rgb.extend_from_slice(entry),
            _ => rgb.extend_from_slice(&[0, 0, 0]),
        }
    }
    rgb
}
