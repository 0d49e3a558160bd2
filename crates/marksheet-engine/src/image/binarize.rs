// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binarization — fixed, Otsu and adaptive thresholds plus morphological
// cleanup. Every function here returns a binary image in which mark (ink)
// pixels are 255 and paper is 0, the polarity contour tracing expects.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::morphology::{dilate, open};
use marksheet_core::config::{AdaptiveMethod, MorphologyStep, ThresholdStrategy};
use tracing::debug;

/// Binarize `gray` with the given strategy. Dark pixels become 255.
pub fn binarize(gray: &GrayImage, strategy: &ThresholdStrategy) -> GrayImage {
    match *strategy {
        ThresholdStrategy::Fixed { level } => threshold_dark(gray, level),
        ThresholdStrategy::Automatic => otsu_inverted(gray),
        ThresholdStrategy::Adaptive {
            block_radius,
            bias,
            method: AdaptiveMethod::Mean,
        } => adaptive_mean(gray, block_radius, bias),
        ThresholdStrategy::Adaptive {
            block_radius,
            bias,
            method: AdaptiveMethod::Gaussian,
        } => adaptive_gaussian(gray, block_radius, bias),
    }
}

/// Pixels at or below `level` become 255.
pub fn threshold_dark(gray: &GrayImage, level: u8) -> GrayImage {
    map_pixels(gray, |value| value <= level)
}

/// Pixels strictly above `level` become 255 (bright foreground, e.g. paper
/// on a dark desk).
pub fn threshold_bright(gray: &GrayImage, level: u8) -> GrayImage {
    map_pixels(gray, |value| value > level)
}

/// Otsu threshold with ink as foreground. A uniform image has no ink.
pub fn otsu_inverted(gray: &GrayImage) -> GrayImage {
    if is_uniform(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    let level = otsu_level(gray);
    debug!(level, "Otsu level computed");
    threshold_dark(gray, level)
}

/// Otsu threshold with paper as foreground. A uniform image has no paper.
pub fn otsu_bright(gray: &GrayImage) -> GrayImage {
    if is_uniform(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    threshold_bright(gray, otsu_level(gray))
}

/// Apply one morphological cleanup step to a binary image.
pub fn apply_morphology(binary: &GrayImage, step: MorphologyStep) -> GrayImage {
    match step {
        MorphologyStep::None | MorphologyStep::Open { radius: 0 } => binary.clone(),
        MorphologyStep::Dilate { radius: 0 } => binary.clone(),
        MorphologyStep::Open { radius } => open(binary, Norm::L1, radius),
        MorphologyStep::Dilate { radius } => dilate(binary, Norm::L1, radius),
    }
}

fn map_pixels(gray: &GrayImage, is_mark: impl Fn(u8) -> bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if is_mark(gray.get_pixel(x, y).0[0]) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn is_uniform(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

/// Local box mean over a `(2r+1)^2` neighbourhood clamped to the image,
/// read from a summed-area table. Marks are pixels at or below
/// `mean - bias`.
fn adaptive_mean(gray: &GrayImage, block_radius: u32, bias: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = integral_image::<_, u64>(gray);
    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
        let right = x.saturating_add(block_radius).min(width - 1);
        let bottom = y.saturating_add(block_radius).min(height - 1);
        let [sum] = sum_image_pixels(&integral, left, top, right, bottom);
        let area = u64::from(right - left + 1) * u64::from(bottom - top + 1);
        let local_mean = sum as f64 / area as f64;
        let value = f64::from(gray.get_pixel(x, y).0[0]);
        if value <= local_mean - f64::from(bias) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Gaussian-weighted local mean. Sigma follows the usual derivation from
/// the kernel size `2r+1`.
fn adaptive_gaussian(gray: &GrayImage, block_radius: u32, bias: i32) -> GrayImage {
    let ksize = (2 * block_radius + 1) as f32;
    let sigma = (0.3 * ((ksize - 1.0) * 0.5 - 1.0) + 0.8).max(0.5);
    let local = gaussian_blur_f32(gray, sigma);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y).0[0] as i32;
        let mean = local.get_pixel(x, y).0[0] as i32;
        if value <= mean - bias {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
