// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card regions — one card's crop of a page, with a lazily built grayscale
// view shared by detection and classification.

use std::sync::OnceLock;

use image::{DynamicImage, GrayImage};

/// One card's pixels plus where it came from on the page.
///
/// The grayscale conversion is computed once on first use and reused by
/// every stage that samples the card. The region owns its pixels, so it can
/// be moved to a worker thread.
#[derive(Debug)]
pub struct CardRegion {
    index: usize,
    top: u32,
    image: DynamicImage,
    gray: OnceLock<GrayImage>,
}

impl CardRegion {
    /// Region `index` whose first row sat at page row `top`.
    pub fn new(index: usize, top: u32, image: DynamicImage) -> Self {
        Self {
            index,
            top,
            image,
            gray: OnceLock::new(),
        }
    }

    /// A whole image treated as a single card.
    pub fn from_image(image: DynamicImage) -> Self {
        Self::new(0, 0, image)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    /// Page row just past the region, before any per-card rectification.
    pub fn bottom(&self) -> u32 {
        self.top + self.image.height()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Grayscale view, converted on first access.
    pub fn gray(&self) -> &GrayImage {
        self.gray.get_or_init(|| self.image.to_luma8())
    }

    /// Drop the cached grayscale view.
    pub fn clear_cache(&mut self) {
        self.gray.take();
    }

    /// Transform the pixels (e.g. rectify them), keeping index and page
    /// position. The grayscale cache starts empty again.
    pub fn map_image(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        Self::new(self.index, self.top, f(self.image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn gray_view_is_cached() {
        let region = CardRegion::from_image(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            4,
            3,
            Rgb([10, 10, 10]),
        )));
        let first = region.gray() as *const GrayImage;
        let second = region.gray() as *const GrayImage;
        assert_eq!(first, second);
        assert_eq!(region.gray().get_pixel(0, 0).0[0], 10);
    }

    #[test]
    fn map_image_resets_cache_and_keeps_position() {
        let region = CardRegion::new(
            2,
            450,
            DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([0u8]))),
        );
        assert_eq!(region.gray().get_pixel(0, 0).0[0], 0);
        let region = region.map_image(|old| {
            assert_eq!(old.width(), 5);
            DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([200u8])))
        });
        assert_eq!(region.index(), 2);
        assert_eq!(region.top(), 450);
        assert_eq!(region.bottom(), 456);
        assert_eq!(region.gray().get_pixel(0, 0).0[0], 200);
    }

    #[test]
    fn clear_cache_rebuilds_on_demand() {
        let mut region =
            CardRegion::from_image(DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([77u8]))));
        let _ = region.gray();
        region.clear_cache();
        assert_eq!(region.gray().get_pixel(1, 1).0[0], 77);
    }
}
