//! Subject framing for preprocessed dataset images
//!
//! After background removal every background pixel is pure black. Framing
//! finds the tight box around the remaining subject, crops to it, scales the
//! crop uniformly so it fits a fixed canvas, and pastes it centered on a black
//! canvas of that size.

use crate::error::{DatasetError, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Pixel value that marks background after removal
pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Output canvas dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self::new(448, 256)
    }
}

impl std::fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangle enclosing every non-background pixel
///
/// Coordinates are signed: an image without any subject pixel keeps the scan's
/// initial values (`left = width`, `top = height`, `right = bottom = -1`), which
/// gives a negative size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl BoundingBox {
    /// Box size as `(right - left, bottom - top)`
    #[must_use]
    pub fn size(&self) -> (i64, i64) {
        (self.right - self.left, self.bottom - self.top)
    }

    /// True when the scan found no subject pixel at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    /// Crop rectangle `(x, y, width, height)` covering `[left, right) x [top, bottom)`
    ///
    /// # Errors
    /// - `EmptySubject` if the box is empty or has no area to scale
    pub fn crop_rect(&self) -> Result<(u32, u32, u32, u32)> {
        if self.is_empty() {
            return Err(DatasetError::empty_subject(
                "image is entirely background after removal",
            ));
        }

        let (width, height) = self.size();
        if width == 0 || height == 0 {
            return Err(DatasetError::empty_subject(format!(
                "subject bounding box {}x{} has no area",
                width, height
            )));
        }

        let to_u32 = |v: i64| {
            u32::try_from(v).map_err(|_| {
                DatasetError::processing(format!("bounding box coordinate {v} out of range"))
            })
        };

        Ok((
            to_u32(self.left)?,
            to_u32(self.top)?,
            to_u32(width)?,
            to_u32(height)?,
        ))
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Where a scaled subject lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Scaled subject size `(width, height)`
    pub size: (u32, u32),
    /// Top-left corner of the subject on the canvas
    pub offset: (u32, u32),
}

/// Summary of one framing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingInfo {
    pub bounds: BoundingBox,
    pub placement: Placement,
}

/// Scan every pixel and return the box around all non-black pixels
#[must_use]
pub fn find_subject_bounds(image: &RgbImage) -> BoundingBox {
    let (width, height) = image.dimensions();
    let mut bounds = BoundingBox {
        left: i64::from(width),
        top: i64::from(height),
        right: -1,
        bottom: -1,
    };

    for (x, y, pixel) in image.enumerate_pixels() {
        if *pixel != BACKGROUND {
            let (x, y) = (i64::from(x), i64::from(y));
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.top = bounds.top.min(y);
            bounds.bottom = bounds.bottom.max(y);
        }
    }

    bounds
}

/// Compute the scaled size and centering offset for a subject on a canvas
///
/// The scale is `min(canvas_w / w, canvas_h / h)` and each scaled side is the
/// truncated product. Integer arithmetic keeps the limiting side exactly on the
/// canvas edge. Each side is at least one pixel.
///
/// # Errors
/// - `EmptySubject` if either subject side is zero
/// - `InvalidConfig` if either canvas side is zero
pub fn plan_placement(subject: (u32, u32), canvas: CanvasSize) -> Result<Placement> {
    let (width, height) = subject;
    if width == 0 || height == 0 {
        return Err(DatasetError::empty_subject(format!(
            "cannot scale a {}x{} subject",
            width, height
        )));
    }
    if canvas.width == 0 || canvas.height == 0 {
        return Err(DatasetError::invalid_config(format!(
            "canvas {} has no area",
            canvas
        )));
    }

    let (w, h) = (u64::from(width), u64::from(height));
    let (cw, ch) = (u64::from(canvas.width), u64::from(canvas.height));

    // cw / w <= ch / h, compared without division
    let (scaled_w, scaled_h) = if cw * h <= ch * w {
        (cw, h * cw / w)
    } else {
        (w * ch / h, ch)
    };

    // Both values are bounded by the canvas, so they fit in u32
    let scaled = (scaled_w.max(1) as u32, scaled_h.max(1) as u32);
    let offset = (
        (canvas.width - scaled.0) / 2,
        (canvas.height - scaled.1) / 2,
    );

    Ok(Placement {
        size: scaled,
        offset,
    })
}

/// Resize a cropped subject to fit the canvas and paste it centered on black
///
/// # Errors
/// - `EmptySubject` if the subject has no area
/// - `InvalidConfig` if the canvas has no area
pub fn resize_and_center(subject: &RgbImage, canvas: CanvasSize) -> Result<(RgbImage, Placement)> {
    let placement = plan_placement(subject.dimensions(), canvas)?;

    let resized = imageops::resize(
        subject,
        placement.size.0,
        placement.size.1,
        FilterType::Lanczos3,
    );

    let mut output = RgbImage::from_pixel(canvas.width, canvas.height, BACKGROUND);
    imageops::replace(
        &mut output,
        &resized,
        i64::from(placement.offset.0),
        i64::from(placement.offset.1),
    );

    Ok((output, placement))
}

/// Bounding box, crop and resize-and-center in one step
///
/// # Errors
/// - `EmptySubject` if no usable subject remains after background removal
/// - `InvalidConfig` if the canvas has no area
pub fn frame_subject(image: &RgbImage, canvas: CanvasSize) -> Result<(RgbImage, FramingInfo)> {
    let bounds = find_subject_bounds(image);
    let (x, y, width, height) = bounds.crop_rect()?;

    let subject = imageops::crop_imm(image, x, y, width, height).to_image();
    let (framed, placement) = resize_and_center(&subject, canvas)?;

    log::trace!(
        "Framed subject: bounds {}, scaled {}x{} at ({}, {})",
        bounds,
        placement.size.0,
        placement.size.1,
        placement.offset.0,
        placement.offset.1
    );

    Ok((framed, FramingInfo { bounds, placement }))
}
