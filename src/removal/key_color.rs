//! Backdrop keying for studio-style photos

use super::{flatten_onto_black, BackgroundRemover};
use crate::error::Result;
use image::{DynamicImage, Rgb, RgbImage};

/// Per-channel distance below which a pixel counts as backdrop
pub const DEFAULT_TOLERANCE: u8 = 30;

/// Blacks out every pixel close to the colour found in the image corners
#[derive(Debug, Clone, Copy)]
pub struct KeyColorRemover {
    tolerance: u8,
}

impl KeyColorRemover {
    #[must_use]
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    #[must_use]
    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    /// Backdrop colour: channel-wise median of the four corner pixels
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // mean of two u8
    pub fn sample_backdrop(image: &RgbImage) -> Rgb<u8> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Rgb([0, 0, 0]);
        }

        let corners = [
            image.get_pixel(0, 0),
            image.get_pixel(w - 1, 0),
            image.get_pixel(0, h - 1),
            image.get_pixel(w - 1, h - 1),
        ];

        let mut key = [0u8; 3];
        for (channel, slot) in key.iter_mut().enumerate() {
            let mut values = corners.map(|p| p.0.get(channel).copied().unwrap_or(0));
            values.sort_unstable();
            let [_, low, high, _] = values;
            *slot = ((u16::from(low) + u16::from(high)) / 2) as u8;
        }
        Rgb(key)
    }

    fn is_backdrop(&self, pixel: Rgb<u8>, key: Rgb<u8>) -> bool {
        pixel
            .0
            .iter()
            .zip(key.0.iter())
            .all(|(&p, &k)| p.abs_diff(k) <= self.tolerance)
    }
}

impl Default for KeyColorRemover {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl BackgroundRemover for KeyColorRemover {
    fn name(&self) -> &str {
        "key-color"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<RgbImage> {
        let mut rgb = flatten_onto_black(image);
        let key = Self::sample_backdrop(&rgb);
        log::trace!("Backdrop colour {:?}, tolerance {}", key.0, self.tolerance);

        for pixel in rgb.pixels_mut() {
            if self.is_backdrop(*pixel, key) {
                *pixel = Rgb([0, 0, 0]);
            }
        }

        Ok(rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn studio_shot() -> RgbImage {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([240, 240, 240]));
        for y in 5..12 {
            for x in 10..30 {
                img.put_pixel(x, y, Rgb([180, 20, 20]));
            }
        }
        img
    }

    #[test]
    fn test_sample_backdrop_uses_corner_median() {
        let mut img = studio_shot();
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        assert_eq!(KeyColorRemover::sample_backdrop(&img), Rgb([240, 240, 240]));
    }

    #[test]
    fn test_backdrop_becomes_black_subject_survives() {
        let remover = KeyColorRemover::default();
        let out = remover
            .remove_background(&DynamicImage::ImageRgb8(studio_shot()))
            .unwrap();

        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(39, 19), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(15, 8), &Rgb([180, 20, 20]));
    }

    #[test]
    fn test_tolerance_bounds_are_inclusive() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        img.put_pixel(1, 1, Rgb([110, 100, 100]));
        img.put_pixel(2, 2, Rgb([111, 100, 100]));

        let out = KeyColorRemover::new(10)
            .remove_background(&DynamicImage::ImageRgb8(img))
            .unwrap();
        assert_eq!(out.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(2, 2), &Rgb([111, 100, 100]));
    }

    #[test]
    fn test_uniform_image_is_entirely_background() {
        let img = RgbImage::from_pixel(8, 8, Rgb([12, 200, 90]));
        let out = KeyColorRemover::default()
            .remove_background(&DynamicImage::ImageRgb8(img))
            .unwrap();
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
