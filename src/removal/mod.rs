//! Background removal
//!
//! Every remover produces an RGB image of the input's size in which the
//! background is pure black, ready for [`crate::framing::find_subject_bounds`].

mod key_color;
#[cfg(feature = "tract")]
mod segmentation;

pub use key_color::{KeyColorRemover, DEFAULT_TOLERANCE};
#[cfg(feature = "tract")]
pub use segmentation::SegmentationRemover;

use crate::error::{DatasetError, Result};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

/// Turns a decoded photo into a subject on black
pub trait BackgroundRemover: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Remove the background of `image`
    ///
    /// # Errors
    /// - Inference or image processing failures
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbImage>;
}

/// Composite `rgb` onto black using `alpha` as coverage
///
/// Each channel becomes `c * a / 255`.
///
/// # Errors
/// - The mask and image dimensions differ
pub fn composite_on_black(rgb: &RgbImage, alpha: &GrayImage) -> Result<RgbImage> {
    if rgb.dimensions() != alpha.dimensions() {
        return Err(DatasetError::processing(format!(
            "Mask size {:?} does not match image size {:?}",
            alpha.dimensions(),
            rgb.dimensions()
        )));
    }

    Ok(RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let a = u16::from(alpha.get_pixel(x, y)[0]);
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        Rgb([scale(r, a), scale(g, a), scale(b, a)])
    }))
}

/// Drop any alpha channel by compositing onto black
#[must_use]
pub fn flatten_onto_black(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u16::from(a);
        Rgb([scale(r, a), scale(g, a), scale(b, a)])
    })
}

#[allow(clippy::cast_possible_truncation)] // c * a / 255 <= 255
fn scale(channel: u8, alpha: u16) -> u8 {
    (u16::from(channel) * alpha / 255) as u8
}
