// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preprocessing chain: turns a raw page image into an OCR-ready one.
//
// Stage order is fixed: denoise → contrast → binarize → noise removal →
// resolution normalization. Every stage is individually toggleable, and a
// stage that fails hands its input through unchanged and records a warning.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{ThresholdType, equalize_histogram, otsu_level, threshold};
use imageproc::filter::median_filter;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::{debug, instrument, warn};
use vibeparser_core::{BinarizeMethod, PageWarning, PreprocessingOptions, Result, VibeError};

use crate::image::ImageProcessor;

/// Local-mean neighbourhood radius for adaptive binarization.
const ADAPTIVE_BLOCK_RADIUS: u32 = 15;
/// Offset subtracted from the local mean before thresholding.
const ADAPTIVE_OFFSET: i32 = 10;

/// Longest-side bounds, in pixels, after resolution normalization.
pub const MIN_LONGEST_SIDE: u32 = 1000;
pub const MAX_LONGEST_SIDE: u32 = 4096;

const BLACK: u8 = 0;
const WHITE: u8 = 255;

/// One step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Denoise,
    Contrast,
    Binarize,
    NoiseRemoval,
    NormalizeResolution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denoise => "denoise",
            Self::Contrast => "contrast",
            Self::Binarize => "binarize",
            Self::NoiseRemoval => "noise_removal",
            Self::NormalizeResolution => "normalize_resolution",
        }
    }
}

/// Output of [`PreprocessingChain::prepare`].
#[derive(Debug, Clone)]
pub struct Prepared {
    pub image: DynamicImage,
    /// One entry per stage that failed and was passed through.
    pub warnings: Vec<PageWarning>,
}

/// The fixed-order preprocessing chain. Stateless; safe to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessingChain;

impl PreprocessingChain {
    /// Run every enabled stage over `image`.
    ///
    /// With the chain disabled, or every stage off, the input is returned
    /// untouched. Otherwise the output is 8-bit grayscale.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn prepare(&self, image: DynamicImage, options: &PreprocessingOptions) -> Prepared {
        let any_stage = options.denoise
            || options.contrast
            || options.binarize
            || options.noise_removal
            || options.normalize_resolution;
        if !options.enabled || !any_stage {
            return Prepared {
                image,
                warnings: Vec::new(),
            };
        }

        let mut warnings = Vec::new();
        let mut gray = image.to_luma8();
        let mut binary = false;

        if options.denoise {
            let radius = options.denoise_strength.max(1);
            gray = run_stage(Stage::Denoise, gray, &mut warnings, |g| {
                Ok(median_filter(&g, radius, radius))
            });
        }
        if options.contrast {
            gray = run_stage(Stage::Contrast, gray, &mut warnings, |g| {
                Ok(equalize_histogram(&g))
            });
        }
        if options.binarize {
            let method = options.binarize_method;
            let before = warnings.len();
            gray = run_stage(Stage::Binarize, gray, &mut warnings, |g| match method {
                BinarizeMethod::Adaptive => {
                    Ok(adaptive_binarize(&g, ADAPTIVE_BLOCK_RADIUS, ADAPTIVE_OFFSET))
                }
                BinarizeMethod::Otsu => otsu_binarize(&g),
            });
            binary = warnings.len() == before;
        }
        // Speck removal is defined on bilevel images only.
        if options.noise_removal && binary {
            gray = run_stage(Stage::NoiseRemoval, gray, &mut warnings, |g| {
                Ok(remove_isolated_pixels(&g))
            });
        }
        if options.normalize_resolution {
            let filter = if binary {
                FilterType::Nearest
            } else {
                FilterType::CatmullRom
            };
            gray = run_stage(Stage::NormalizeResolution, gray, &mut warnings, |g| {
                let fitted = ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(g))
                    .fit_longest_side(MIN_LONGEST_SIDE, MAX_LONGEST_SIDE, filter);
                Ok(fitted.into_dynamic().to_luma8())
            });
        }

        debug!(
            width = gray.width(),
            height = gray.height(),
            degraded = warnings.len(),
            "Preprocessing complete"
        );
        Prepared {
            image: DynamicImage::ImageLuma8(gray),
            warnings,
        }
    }
}

/// Apply one stage; on failure, log, record the warning and return the input.
fn run_stage<F>(stage: Stage, input: GrayImage, warnings: &mut Vec<PageWarning>, op: F) -> GrayImage
where
    F: FnOnce(GrayImage) -> Result<GrayImage>,
{
    let outcome = if input.width() == 0 || input.height() == 0 {
        Err(VibeError::Image(format!(
            "empty {}x{} image",
            input.width(),
            input.height()
        )))
    } else {
        op(input.clone())
    };
    match outcome {
        Ok(output) => output,
        Err(err) => {
            warn!(stage = stage.as_str(), %err, "Preprocessing stage degraded; passing image through");
            warnings.push(PageWarning::PreprocessingDegraded {
                stage: stage.as_str().to_string(),
                reason: err.to_string(),
            });
            input
        }
    }
}

// -- Binarization -------------------------------------------------------------

/// Largest image `otsu_level` can histogram without overflowing its sums.
const OTSU_MAX_PIXELS: u64 = u32::MAX as u64 / 255;

/// Local-mean threshold: a pixel is black when darker than the mean of its
/// `2r+1` square neighbourhood minus `offset`.
fn adaptive_binarize(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let sums = integral_image::<_, u64>(gray);
    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
        let right = (x + block_radius).min(width - 1);
        let bottom = (y + block_radius).min(height - 1);
        let area = u64::from(right - left + 1) * u64::from(bottom - top + 1);
        let mean = sum_image_pixels(&sums, left, top, right, bottom)[0] / area;
        let limit = (mean as i32 - offset).clamp(0, 255) as u8;
        Luma([if gray.get_pixel(x, y).0[0] < limit { BLACK } else { WHITE }])
    })
}

/// Global Otsu threshold; pixels at or below the level turn black.
fn otsu_binarize(gray: &GrayImage) -> Result<GrayImage> {
    let pixels = u64::from(gray.width()) * u64::from(gray.height());
    if pixels > OTSU_MAX_PIXELS {
        return Err(VibeError::Image(format!(
            "{pixels} pixels is too many for Otsu binarization"
        )));
    }
    Ok(threshold(gray, otsu_level(gray), ThresholdType::Binary))
}

// -- Noise removal ------------------------------------------------------------

/// Whiten black pixels with no black 8-neighbour.
fn remove_isolated_pixels(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    let is_black = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && x < i64::from(width)
            && y < i64::from(height)
            && binary.get_pixel(x as u32, y as u32).0[0] == BLACK
    };
    GrayImage::from_fn(width, height, |x, y| {
        let (xi, yi) = (i64::from(x), i64::from(y));
        if !is_black(xi, yi) {
            return Luma([WHITE]);
        }
        let has_neighbour = (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .any(|(dx, dy)| is_black(xi + dx, yi + dy));
        Luma([if has_neighbour { BLACK } else { WHITE }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with a dark 40x20 block and one stray dark pixel.
    fn page() -> DynamicImage {
        let mut gray = GrayImage::from_pixel(200, 100, Luma([230]));
        for y in 40..60 {
            for x in 80..120 {
                gray.put_pixel(x, y, Luma([20]));
            }
        }
        gray.put_pixel(10, 10, Luma([20]));
        DynamicImage::ImageLuma8(gray)
    }

    fn only(stage: impl Fn(&mut PreprocessingOptions)) -> PreprocessingOptions {
        let mut options = PreprocessingOptions {
            denoise: false,
            contrast: false,
            binarize: false,
            noise_removal: false,
            normalize_resolution: false,
            ..PreprocessingOptions::default()
        };
        stage(&mut options);
        options
    }

    #[test]
    fn disabled_chain_is_identity() {
        let input = page();
        let prepared = PreprocessingChain.prepare(input.clone(), &PreprocessingOptions::disabled());
        assert_eq!(prepared.image, input);
        assert!(prepared.warnings.is_empty());
    }

    #[test]
    fn all_stages_off_is_identity() {
        let input = DynamicImage::ImageRgb8(image::RgbImage::new(5, 5));
        let prepared = PreprocessingChain.prepare(input.clone(), &only(|_| {}));
        assert_eq!(prepared.image, input);
    }

    #[test]
    fn full_chain_yields_bilevel_normalized_image() {
        let prepared = PreprocessingChain.prepare(page(), &PreprocessingOptions::default());
        assert!(prepared.warnings.is_empty());
        let gray = prepared.image.to_luma8();
        assert_eq!(gray.width(), MIN_LONGEST_SIDE);
        assert_eq!(gray.height(), 500);
        assert!(gray.pixels().all(|p| p.0[0] == BLACK || p.0[0] == WHITE));
    }

    #[test]
    fn chain_is_deterministic() {
        let options = PreprocessingOptions::default();
        let a = PreprocessingChain.prepare(page(), &options);
        let b = PreprocessingChain.prepare(page(), &options);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn adaptive_binarize_keeps_the_block_and_drops_the_background() {
        let prepared = PreprocessingChain.prepare(page(), &only(|o| o.binarize = true));
        let gray = prepared.image.to_luma8();
        assert_eq!(gray.get_pixel(50, 80).0[0], WHITE);
        assert_eq!(gray.get_pixel(81, 41).0[0], BLACK);
    }

    #[test]
    fn otsu_separates_two_levels() {
        let binary = otsu_binarize(&page().to_luma8()).unwrap();
        assert_eq!(binary.get_pixel(100, 50).0[0], BLACK);
        assert_eq!(binary.get_pixel(0, 0).0[0], WHITE);
    }

    #[test]
    fn isolated_specks_are_removed() {
        let options = only(|o| {
            o.binarize = true;
            o.binarize_method = BinarizeMethod::Otsu;
            o.noise_removal = true;
        });
        let gray = PreprocessingChain.prepare(page(), &options).image.to_luma8();
        assert_eq!(gray.get_pixel(10, 10).0[0], WHITE);
        assert_eq!(gray.get_pixel(100, 50).0[0], BLACK);
    }

    #[test]
    fn failing_stages_pass_the_image_through_with_warnings() {
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let prepared = PreprocessingChain.prepare(empty, &PreprocessingOptions::default());
        assert_eq!((prepared.image.width(), prepared.image.height()), (0, 0));

        let stages: Vec<String> = prepared
            .warnings
            .iter()
            .map(|PageWarning::PreprocessingDegraded { stage, .. }| stage.clone())
            .collect();
        // Noise removal only runs after a successful binarization.
        assert_eq!(
            stages,
            vec!["denoise", "contrast", "binarize", "normalize_resolution"]
        );
    }

    #[test]
    fn adaptive_window_is_clipped_at_the_edges() {
        // A flat image never drops below its own mean minus the offset.
        let gray = GrayImage::from_pixel(4, 4, Luma([100]));
        let binary = adaptive_binarize(&gray, 10, ADAPTIVE_OFFSET);
        assert!(binary.pixels().all(|p| p.0[0] == WHITE));

        let binary = adaptive_binarize(&gray, 10, -1);
        assert!(binary.pixels().all(|p| p.0[0] == BLACK));
    }
}
