//! Per-user cache of downloaded segmentation models
//!
//! Each model lives in its own directory named by a model id derived from
//! its source URL, in `HuggingFace` layout: an optional
//! `preprocessor_config.json` plus `onnx/model*.onnx` variants.

use crate::error::{DatasetError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "CAR_DATASET_CACHE_DIR";

/// Default segmentation model repository
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/imgly/isnet-general-onnx";

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Summary of one cached model
#[derive(Debug, Clone, Serialize)]
pub struct CachedModelInfo {
    pub model_id: String,
    pub path: PathBuf,
    pub has_preprocessor: bool,
    /// Available ONNX variants, sorted (`fp16`, `fp32`, ...)
    pub variants: Vec<String>,
    pub size_bytes: u64,
}

/// Location of the model cache
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the cache at `$CAR_DATASET_CACHE_DIR/models` or the user cache directory
    ///
    /// # Errors
    /// - No user cache directory can be determined
    /// - The cache directory cannot be created
    pub fn new() -> Result<Self> {
        let root = match std::env::var_os(CACHE_DIR_ENV) {
            Some(root) => PathBuf::from(root),
            None => dirs::cache_dir()
                .ok_or_else(|| {
                    DatasetError::invalid_config(format!(
                        "Failed to determine cache directory. Set {} environment variable.",
                        CACHE_DIR_ENV
                    ))
                })?
                .join("car-dataset"),
        };
        Self::with_custom_cache_dir(&root)
    }

    /// Open the cache under `root/models`
    ///
    /// # Errors
    /// - The cache directory cannot be created
    pub fn with_custom_cache_dir(root: &Path) -> Result<Self> {
        let cache_dir = root.join("models");
        fs::create_dir_all(&cache_dir)
            .map_err(|e| DatasetError::file_io_error("create cache directory", &cache_dir, &e))?;
        Ok(Self { cache_dir })
    }

    /// Cache-safe identifier for a model URL
    ///
    /// `HuggingFace` repository URLs map to `user--repo`; any other URL maps to
    /// `url-` followed by a prefix of its SHA-256.
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        if let Some(repo) = url.strip_prefix(HUGGINGFACE_PREFIX) {
            return repo.trim_end_matches('/').replace('/', "--");
        }

        use sha2::{Digest, Sha256};
        let digest = format!("url-{:x}", Sha256::digest(url.as_bytes()));
        digest.get(..16).unwrap_or(&digest).to_string()
    }

    #[must_use]
    pub fn default_model_id() -> String {
        Self::url_to_model_id(DEFAULT_MODEL_URL)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory of a model (may not exist)
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// True when the model directory holds at least one ONNX variant
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        !scan_variants(&self.model_path(model_id)).is_empty()
    }

    /// All usable cached models, sorted by id
    ///
    /// # Errors
    /// - The cache directory cannot be read
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        for path in self.model_directories()? {
            let variants = scan_variants(&path);
            if variants.is_empty() {
                log::debug!("Skipping incomplete model directory {}", path.display());
                continue;
            }

            let model_id = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            models.push(CachedModelInfo {
                model_id,
                has_preprocessor: path.join("preprocessor_config.json").is_file(),
                size_bytes: directory_size(&path),
                variants,
                path,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove one model; returns `false` if it was not cached
    ///
    /// # Errors
    /// - The model directory cannot be removed
    pub fn clear_model(&self, model_id: &str) -> Result<bool> {
        let path = self.model_path(model_id);
        if !path.is_dir() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&path)
            .map_err(|e| DatasetError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }

    /// Remove every cached model and return their ids
    ///
    /// # Errors
    /// - The cache directory cannot be read or a model cannot be removed
    pub fn clear_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for path in self.model_directories()? {
            fs::remove_dir_all(&path)
                .map_err(|e| DatasetError::file_io_error("remove cached model", &path, &e))?;
            if let Some(name) = path.file_name() {
                removed.push(name.to_string_lossy().into_owned());
            }
        }

        removed.sort();
        Ok(removed)
    }

    fn model_directories(&self) -> Result<Vec<PathBuf>> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            DatasetError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        let mut directories = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                DatasetError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            // In-flight downloads are staged in hidden temp directories
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if path.is_dir() && !hidden {
                directories.push(path);
            }
        }
        Ok(directories)
    }
}

/// ONNX variants present in a model directory, sorted
///
/// `model.onnx` is `fp32`, `model_<name>.onnx` is `<name>`.
#[must_use]
pub fn scan_variants(model_path: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(model_path.join("onnx")) else {
        return Vec::new();
    };

    let mut variants: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name().to_str()?.to_string();
            let stem = file_name.strip_suffix(".onnx")?;
            if stem == "model" {
                Some("fp32".to_string())
            } else {
                stem.strip_prefix("model_").map(str::to_string)
            }
        })
        .collect();

    variants.sort();
    variants.dedup();
    variants
}

/// ONNX file for a variant inside a model directory
#[must_use]
pub fn variant_file(model_path: &Path, variant: &str) -> PathBuf {
    let onnx_dir = model_path.join("onnx");
    match variant {
        "fp32" => onnx_dir.join("model.onnx"),
        other => onnx_dir.join(format!("model_{}.onnx", other)),
    }
}

fn directory_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let label = UNITS.get(unit).unwrap_or(&"B");
    if unit == 0 {
        format!("{} {}", bytes, label)
    } else {
        format!("{:.1} {}", size, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_model(cache: &ModelCache, model_id: &str, files: &[&str]) -> PathBuf {
        let path = cache.model_path(model_id);
        fs::create_dir_all(path.join("onnx")).unwrap();
        for file in files {
            fs::write(path.join(file), b"0123456789").unwrap();
        }
        path
    }

    #[test]
    fn test_url_to_model_id() {
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx"),
            "imgly--isnet-general-onnx"
        );
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/briaai/RMBG-1.4/"),
            "briaai--RMBG-1.4"
        );

        let hashed = ModelCache::url_to_model_id("https://example.com/models/isnet");
        assert!(hashed.starts_with("url-"));
        assert_eq!(hashed.len(), 16);
        assert_eq!(
            hashed,
            ModelCache::url_to_model_id("https://example.com/models/isnet")
        );
    }

    #[test]
    fn test_default_model_id() {
        assert_eq!(ModelCache::default_model_id(), "imgly--isnet-general-onnx");
    }

    #[test]
    fn test_custom_cache_dir_is_created() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        assert_eq!(cache.cache_dir(), temp.path().join("models"));
        assert!(cache.cache_dir().is_dir());
    }

    #[test]
    fn test_scan_cached_models() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();

        create_model(
            &cache,
            "imgly--isnet-general-onnx",
            &["preprocessor_config.json", "onnx/model.onnx", "onnx/model_fp16.onnx"],
        );
        create_model(&cache, "a--bare", &["onnx/model.onnx"]);
        // No ONNX variant: not usable
        fs::create_dir_all(cache.model_path("broken")).unwrap();
        // Staging directory of an unfinished download
        create_model(&cache, ".tmp-download", &["onnx/model.onnx"]);

        let models = cache.scan_cached_models().unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, vec!["a--bare", "imgly--isnet-general-onnx"]);

        let isnet = &models[1];
        assert!(isnet.has_preprocessor);
        assert_eq!(isnet.variants, vec!["fp16", "fp32"]);
        assert_eq!(isnet.size_bytes, 30);
        assert!(!models[0].has_preprocessor);

        assert!(cache.is_model_cached("a--bare"));
        assert!(!cache.is_model_cached("broken"));
        assert!(!cache.is_model_cached("missing"));
    }

    #[test]
    fn test_clear_model_and_clear_all() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        create_model(&cache, "one", &["onnx/model.onnx"]);
        create_model(&cache, "two", &["onnx/model_fp16.onnx"]);

        assert!(cache.clear_model("one").unwrap());
        assert!(!cache.clear_model("one").unwrap());
        assert!(!cache.model_path("one").exists());

        create_model(&cache, "three", &["onnx/model.onnx"]);
        assert_eq!(cache.clear_all().unwrap(), vec!["three", "two"]);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_variant_file_paths() {
        let base = Path::new("/cache/m");
        assert_eq!(variant_file(base, "fp32"), base.join("onnx/model.onnx"));
        assert_eq!(variant_file(base, "fp16"), base.join("onnx/model_fp16.onnx"));
        assert_eq!(
            variant_file(base, "quantized"),
            base.join("onnx/model_quantized.onnx")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(176_000_000), "167.8 MB");
    }
}
