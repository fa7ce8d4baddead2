//! Segmentation model resolution and preprocessing parameters

use crate::cache::{scan_variants, variant_file, ModelCache, DEFAULT_MODEL_URL};
use crate::error::{DatasetError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Variants tried in order when none is requested
const VARIANT_PREFERENCE: &[&str] = &["fp32", "fp16"];

/// Input preprocessing parameters of a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input size as `(width, height)`
    pub target_size: (u32, u32),
    /// Per-channel mean in the 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in the 0-1 range
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    /// `ISNet` defaults
    fn default() -> Self {
        Self {
            target_size: (1024, 1024),
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Deserialize)]
struct HfPreprocessorConfig {
    size: Option<HfSize>,
    image_mean: Option<Vec<f32>>,
    image_std: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct HfSize {
    width: u32,
    height: u32,
}

impl PreprocessingConfig {
    /// Parse a `HuggingFace` `preprocessor_config.json`
    ///
    /// Mean and std are given in the 0-255 range and converted to 0-1.
    /// Missing fields keep their defaults.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Zero input size, fewer than three mean/std values, or a zero std
    pub fn from_huggingface_json(json: &str) -> Result<Self> {
        let parsed: HfPreprocessorConfig = serde_json::from_str(json).map_err(|e| {
            DatasetError::model(format!("Failed to parse preprocessor config: {}", e))
        })?;

        let mut config = Self::default();

        if let Some(size) = parsed.size {
            if size.width == 0 || size.height == 0 {
                return Err(DatasetError::model("Preprocessor config has a zero input size"));
            }
            config.target_size = (size.width, size.height);
        }
        if let Some(mean) = parsed.image_mean {
            config.normalization_mean = channel_triplet(&mean, "image_mean")?;
        }
        if let Some(std) = parsed.image_std {
            let std = channel_triplet(&std, "image_std")?;
            if std.iter().any(|&v| v <= 0.0) {
                return Err(DatasetError::model("image_std values must be positive"));
            }
            config.normalization_std = std;
        }

        Ok(config)
    }
}

fn channel_triplet(values: &[f32], name: &str) -> Result<[f32; 3]> {
    match values {
        [r, g, b, ..] => Ok([r / 255.0, g / 255.0, b / 255.0]),
        _ => Err(DatasetError::model(format!(
            "{} must have at least 3 values",
            name
        ))),
    }
}

/// Where a model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Model directory in the cache, by id
    Cached(String),
    /// Model directory on disk in `HuggingFace` layout
    Directory(PathBuf),
}

impl ModelSource {
    /// Interpret a user argument: a URL maps to its cache id, an existing
    /// directory is used in place, anything else is a cache id
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Cached(ModelCache::url_to_model_id(value))
        } else if Path::new(value).is_dir() {
            Self::Directory(PathBuf::from(value))
        } else {
            Self::Cached(value.to_string())
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Cached(id) => format!("cached:{}", id),
            Self::Directory(path) => format!("path:{}", path.display()),
        }
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Cached(ModelCache::url_to_model_id(DEFAULT_MODEL_URL))
    }
}

/// A resolved model file and its preprocessing parameters
#[derive(Debug, Clone)]
pub struct SegmentationModel {
    pub name: String,
    pub variant: String,
    pub onnx_path: PathBuf,
    pub preprocessing: PreprocessingConfig,
}

impl SegmentationModel {
    /// Resolve a model source to a concrete ONNX file
    ///
    /// # Errors
    /// - The model directory has no ONNX variant
    /// - The requested variant is not present
    /// - The preprocessor config exists but is invalid
    pub fn resolve(
        source: &ModelSource,
        variant: Option<&str>,
        cache: &ModelCache,
    ) -> Result<Self> {
        let model_dir = match source {
            ModelSource::Cached(id) => cache.model_path(id),
            ModelSource::Directory(path) => path.clone(),
        };

        let available = scan_variants(&model_dir);
        if available.is_empty() {
            return Err(DatasetError::model(format!(
                "No ONNX model found for {} in {}. Download it with `car-dataset model download`.",
                source.display_name(),
                model_dir.display()
            )));
        }

        let variant = select_variant(&available, variant)?;
        let preprocessing = load_preprocessing(&model_dir)?;

        Ok(Self {
            name: source.display_name(),
            onnx_path: variant_file(&model_dir, &variant),
            variant,
            preprocessing,
        })
    }

    /// Read the ONNX file
    ///
    /// # Errors
    /// - The file cannot be read
    pub fn load_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.onnx_path)
            .map_err(|e| DatasetError::file_io_error("read model file", &self.onnx_path, &e))
    }
}

fn select_variant(available: &[String], requested: Option<&str>) -> Result<String> {
    if let Some(requested) = requested {
        return available
            .iter()
            .find(|v| v.as_str() == requested)
            .cloned()
            .ok_or_else(|| {
                DatasetError::model(format!(
                    "Requested variant '{}' not available. Available: {}",
                    requested,
                    available.join(", ")
                ))
            });
    }

    VARIANT_PREFERENCE
        .iter()
        .find_map(|preferred| available.iter().find(|v| v.as_str() == *preferred))
        .or_else(|| available.first())
        .cloned()
        .ok_or_else(|| DatasetError::model("No model variants available"))
}

fn load_preprocessing(model_dir: &Path) -> Result<PreprocessingConfig> {
    let path = model_dir.join("preprocessor_config.json");
    if !path.is_file() {
        log::debug!(
            "No preprocessor config in {}, using ISNet defaults",
            model_dir.display()
        );
        return Ok(PreprocessingConfig::default());
    }

    let json = fs::read_to_string(&path)
        .map_err(|e| DatasetError::file_io_error("read preprocessor config", &path, &e))?;
    PreprocessingConfig::from_huggingface_json(&json)
}
