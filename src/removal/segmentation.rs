//! Salient-object segmentation with Tract
//!
//! Runs an `ISNet`-style ONNX model on the CPU. The photo is letterboxed into
//! the model input, the predicted mask is mapped back onto the original pixel
//! grid and used as alpha when compositing onto black.

use super::{composite_on_black, BackgroundRemover};
use crate::error::{DatasetError, Result};
use crate::models::{PreprocessingConfig, SegmentationModel};
use crate::tracing_config::spans;
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage};
use instant::Instant;
use ndarray::Array4;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Padding used around the letterboxed photo
const PADDING: [u8; 3] = [255, 255, 255];

/// Where the photo sits inside the model input
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    offset_x: u32,
    offset_y: u32,
    /// Size of the scaled photo inside the model input
    width: u32,
    height: u32,
}

impl Letterbox {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fit(original: (u32, u32), target: (u32, u32)) -> (Self, (u32, u32)) {
        let (ow, oh) = original;
        let (tw, th) = target;
        let scale = (tw as f32 / ow as f32).min(th as f32 / oh as f32);

        let width = ((ow as f32 * scale).round() as u32).clamp(1, tw);
        let height = ((oh as f32 * scale).round() as u32).clamp(1, th);

        (
            Self {
                scale,
                offset_x: (tw - width) / 2,
                offset_y: (th - height) / 2,
                width,
                height,
            },
            (width, height),
        )
    }

    /// Model input coordinate for an original pixel, sampled at the pixel
    /// centre and kept inside the scaled photo
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn project(&self, x: u32, y: u32) -> (u32, u32) {
        let along = |v: u32, size: u32| {
            (((v as f32 + 0.5) * self.scale).floor() as u32).min(size.saturating_sub(1))
        };
        (
            along(x, self.width) + self.offset_x,
            along(y, self.height) + self.offset_y,
        )
    }
}

/// Background remover backed by an ONNX segmentation model
pub struct SegmentationRemover {
    model: TractModel,
    preprocessing: PreprocessingConfig,
    label: String,
}

impl std::fmt::Debug for SegmentationRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationRemover")
            .field("label", &self.label)
            .field("preprocessing", &self.preprocessing)
            .finish_non_exhaustive()
    }
}

impl SegmentationRemover {
    /// Load and optimise the model
    ///
    /// # Errors
    /// - The ONNX file cannot be read, parsed or optimised
    pub fn load(model: &SegmentationModel) -> Result<Self> {
        let _span = spans::model_loading(&model.name, &model.variant).entered();
        let start = Instant::now();

        let bytes = model.load_bytes()?;
        #[allow(clippy::cast_precision_loss)]
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
        log::info!(
            "🧠 Loading segmentation model {} ({}, {:.2} MB)",
            model.name,
            model.variant,
            size_mb
        );

        let (width, height) = model.preprocessing.target_size;
        let input_fact = f32::fact([1, 3, height as usize, width as usize]);

        let runnable = onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| DatasetError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, input_fact.into())
            .map_err(|e| DatasetError::model(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| DatasetError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| DatasetError::model(format!("Failed to create runnable model: {e}")))?;

        log::info!(
            "✅ Model ready in {}ms",
            start.elapsed().as_millis()
        );

        Ok(Self {
            model: runnable,
            preprocessing: model.preprocessing.clone(),
            label: format!("segmentation:{}", model.variant),
        })
    }

    fn infer_mask(&self, rgb: &RgbImage) -> Result<GrayImage> {
        let (tensor, letterbox) = to_input_tensor(rgb, &self.preprocessing)?;

        let start = Instant::now();
        let outputs = self
            .model
            .run(tvec![Tensor::from(tensor).into()])
            .map_err(|e| DatasetError::inference(format!("Tract inference failed: {e}")))?;
        log::debug!("Inference took {}ms", start.elapsed().as_millis());

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| DatasetError::inference("Model produced no output"))?;

        mask_from_output(&output, rgb.dimensions(), letterbox)
    }
}

impl BackgroundRemover for SegmentationRemover {
    fn name(&self) -> &str {
        &self.label
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<RgbImage> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(DatasetError::processing("Image has no pixels"));
        }

        let mask = self.infer_mask(&rgb)?;
        composite_on_black(&rgb, &mask)
    }
}

/// Letterbox the photo into the model input and normalise it to NCHW
fn to_input_tensor(
    rgb: &RgbImage,
    preprocessing: &PreprocessingConfig,
) -> Result<(Array4<f32>, Letterbox)> {
    let target = preprocessing.target_size;
    let (letterbox, (width, height)) = Letterbox::fit(rgb.dimensions(), target);
    let resized = image::imageops::resize(rgb, width, height, FilterType::Triangle);

    let (tw, th) = (target.0 as usize, target.1 as usize);
    let mean = preprocessing.normalization_mean;
    let std = preprocessing.normalization_std;
    let normalize = |value: u8, channel: usize| -> f32 {
        let m = mean.get(channel).copied().unwrap_or(0.0);
        let s = std.get(channel).copied().unwrap_or(1.0);
        (f32::from(value) / 255.0 - m) / s
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, th, tw));
    for channel in 0..3 {
        let pad = normalize(PADDING.get(channel).copied().unwrap_or(0), channel);
        tensor
            .slice_mut(ndarray::s![0, channel, .., ..])
            .fill(pad);
    }

    for (x, y, pixel) in resized.enumerate_pixels() {
        let cx = (x + letterbox.offset_x) as usize;
        let cy = (y + letterbox.offset_y) as usize;
        for channel in 0..3 {
            if let Some(slot) = tensor.get_mut([0, channel, cy, cx]) {
                *slot = normalize(pixel.0.get(channel).copied().unwrap_or(0), channel);
            }
        }
    }

    Ok((tensor, letterbox))
}

/// Read the first mask plane and sample it back onto the original grid
fn mask_from_output(
    output: &TValue,
    original: (u32, u32),
    letterbox: Letterbox,
) -> Result<GrayImage> {
    let shape = output.shape();
    if shape.len() < 2 {
        return Err(DatasetError::inference(format!(
            "Expected a mask tensor, got shape {:?}",
            shape
        )));
    }
    let mask_h = shape.get(shape.len() - 2).copied().unwrap_or(0);
    let mask_w = shape.get(shape.len() - 1).copied().unwrap_or(0);
    if mask_w == 0 || mask_h == 0 {
        return Err(DatasetError::inference("Mask tensor is empty"));
    }

    let data = output
        .as_slice::<f32>()
        .map_err(|e| DatasetError::inference(format!("Failed to read mask tensor: {e}")))?;

    Ok(sample_mask(data, (mask_w, mask_h), original, letterbox))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_mask(
    data: &[f32],
    (mask_w, mask_h): (usize, usize),
    (width, height): (u32, u32),
    letterbox: Letterbox,
) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let (mx, my) = letterbox.project(x, y);
        let mx = (mx as usize).min(mask_w - 1);
        let my = (my as usize).min(mask_h - 1);
        let value = data.get(my * mask_w + mx).copied().unwrap_or(0.0);
        Luma([(value.clamp(0.0, 1.0) * 255.0) as u8])
    })
}
