// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, grayscale, scale and encode page images using the
// `image` crate.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument};
use vibeparser_core::{Result, VibeError};

/// Chainable operations on a single in-memory image.
///
/// Each method consumes `self` and returns the transformed processor:
///
/// ```ignore
/// let png = ImageProcessor::from_bytes(&scan)?
///     .grayscale()
///     .fit_longest_side(1000, 4096, FilterType::CatmullRom)
///     .to_png_bytes()?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Decode an encoded image (PNG, JPEG, TIFF, GIF, BMP).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|err| VibeError::Image(format!("failed to decode image: {err}")))?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Convert to 8-bit luma.
    pub fn grayscale(self) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(self.image.to_luma8()),
        }
    }

    /// Resize to exactly `width` x `height`, ignoring aspect ratio.
    pub fn resize_exact(self, width: u32, height: u32, filter: FilterType) -> Self {
        if self.image.width() == width && self.image.height() == height {
            return self;
        }
        Self {
            image: self.image.resize_exact(width.max(1), height.max(1), filter),
        }
    }

    /// Scale so the longest side lies within `[min_side, max_side]`,
    /// preserving aspect ratio. Images already in range are returned as-is.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn fit_longest_side(self, min_side: u32, max_side: u32, filter: FilterType) -> Self {
        let longest = self.image.width().max(self.image.height());
        if longest == 0 || (min_side..=max_side).contains(&longest) {
            return self;
        }
        let target = longest.clamp(min_side, max_side);
        let scale = f64::from(target) / f64::from(longest);
        let width = scaled(self.image.width(), scale);
        let height = scaled(self.image.height(), scale);
        debug!(width, height, scale, "Rescaling image");
        self.resize_exact(width, height, filter)
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_to_format(&self.image, ImageFormat::Png)
    }
}

fn scaled(side: u32, scale: f64) -> u32 {
    ((f64::from(side) * scale).round() as u32).max(1)
}

/// Encode a `DynamicImage` into `format`, returning the raw bytes.
pub fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| VibeError::Image(format!("image encoding failed: {err}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample(width: u32, height: u32) -> ImageProcessor {
        ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([200, 100, 50]),
        )))
    }

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let png = sample(12, 7).to_png_bytes().unwrap();
        let back = ImageProcessor::from_bytes(&png).unwrap();
        assert_eq!((back.width(), back.height()), (12, 7));
    }

    #[test]
    fn small_images_are_upscaled_to_the_minimum_side() {
        let fitted = sample(500, 250).fit_longest_side(1000, 4096, FilterType::Nearest);
        assert_eq!((fitted.width(), fitted.height()), (1000, 500));
    }

    #[test]
    fn huge_images_are_downscaled_to_the_maximum_side() {
        let fitted = sample(50, 8192).fit_longest_side(10, 4096, FilterType::Nearest);
        assert_eq!((fitted.width(), fitted.height()), (25, 4096));
    }

    #[test]
    fn in_range_images_are_untouched() {
        let fitted = sample(1200, 900).fit_longest_side(1000, 4096, FilterType::Nearest);
        assert_eq!((fitted.width(), fitted.height()), (1200, 900));
    }

    #[test]
    fn grayscale_is_single_channel() {
        let gray = sample(3, 3).grayscale();
        assert!(matches!(gray.as_dynamic(), DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            ImageProcessor::from_bytes(b"nope"),
            Err(VibeError::Image(_))
        ));
    }
}
