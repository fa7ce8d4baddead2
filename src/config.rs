//! Configuration types for collection and preprocessing runs

use crate::collect::query::Query;
use crate::error::{DatasetError, Result};
use crate::framing::CanvasSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default search results URL; `{query}` and `{start}` are substituted per page
pub const DEFAULT_SEARCH_URL: &str =
    "https://www.google.com/search?tbm=isch&q={query}&start={start}";

/// Default browser-like user agent for result pages and image fetches
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Configuration for the preprocessing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Root of the raw dataset tree
    pub input_dir: PathBuf,
    /// Root of the mirrored output tree
    pub output_dir: PathBuf,
    /// Processed-image log (resumability checkpoint)
    pub log_path: PathBuf,
    /// Output canvas size
    pub canvas: CanvasSize,
    /// File name glob selecting source images
    pub pattern: String,
    /// JPEG quality for written images (1-100)
    pub jpeg_quality: u8,
    /// Mirror the full relative path instead of only the parent directory name
    pub preserve_hierarchy: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("preprocessed data"),
            log_path: PathBuf::from("processed_images.log"),
            canvas: CanvasSize::default(),
            pattern: "*.jpg".to_string(),
            jpeg_quality: 75,
            preserve_hierarchy: false,
        }
    }
}

impl PreprocessConfig {
    #[must_use]
    pub fn builder() -> PreprocessConfigBuilder {
        PreprocessConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Canvas with a zero side
    /// - JPEG quality outside 1-100
    /// - Pattern that is not a valid glob
    pub fn validate(&self) -> Result<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(DatasetError::config_value_error(
                "canvas size",
                self.canvas,
                "width and height >= 1",
                Some(CanvasSize::default()),
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(DatasetError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(75),
            ));
        }

        glob::Pattern::new(&self.pattern).map_err(|e| {
            DatasetError::invalid_config(format!("Invalid file pattern '{}': {}", self.pattern, e))
        })?;

        Ok(())
    }
}

/// Builder for `PreprocessConfig`
#[derive(Debug, Default)]
pub struct PreprocessConfigBuilder {
    config: PreprocessConfig,
}

impl PreprocessConfigBuilder {
    #[must_use]
    pub fn input_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn log_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.log_path = path.into();
        self
    }

    #[must_use]
    pub fn canvas(mut self, width: u32, height: u32) -> Self {
        self.config.canvas = CanvasSize::new(width, height);
        self
    }

    #[must_use]
    pub fn pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.config.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    #[must_use]
    pub fn preserve_hierarchy(mut self, preserve: bool) -> Self {
        self.config.preserve_hierarchy = preserve;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`PreprocessConfig::validate`]
    pub fn build(self) -> Result<PreprocessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the collection job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Queries processed in order, one directory each
    pub queries: Vec<Query>,
    /// Dataset root receiving one directory per query
    pub data_dir: PathBuf,
    /// Number of parallel download workers per query
    pub workers: usize,
    /// Results page URL template with `{query}` and `{start}` placeholders
    pub search_url: String,
    /// Maximum number of result pages requested per query
    pub max_pages: usize,
    /// Remove a query directory's previous contents before collecting
    pub clear_existing: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            data_dir: PathBuf::from("data"),
            workers: 32,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            max_pages: 5,
            clear_existing: true,
            request_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CollectConfig {
    #[must_use]
    pub fn builder() -> CollectConfigBuilder {
        CollectConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - The file cannot be read
    /// - The JSON is malformed or a query entry has the wrong shape
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read collect config", path, &e))?;
        serde_json::from_str(&contents).map_err(|e| {
            DatasetError::invalid_config(format!(
                "Failed to parse collect config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero workers, zero pages or zero timeout
    /// - Search URL template without a `{query}` placeholder
    /// - A query whose directory name is not a single safe path segment
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DatasetError::config_value_error(
                "worker count",
                self.workers,
                ">= 1",
                Some(32),
            ));
        }

        if self.max_pages == 0 {
            return Err(DatasetError::config_value_error(
                "max pages",
                self.max_pages,
                ">= 1",
                Some(5),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(DatasetError::config_value_error(
                "request timeout (s)",
                self.request_timeout_secs,
                ">= 1",
                Some(60),
            ));
        }

        if !self.search_url.contains("{query}") {
            return Err(DatasetError::invalid_config(format!(
                "Search URL template '{}' must contain a {{query}} placeholder",
                self.search_url
            )));
        }

        for query in &self.queries {
            query.validate()?;
        }

        Ok(())
    }
}

/// Builder for `CollectConfig`
#[derive(Debug, Default)]
pub struct CollectConfigBuilder {
    config: CollectConfig,
}

impl CollectConfigBuilder {
    #[must_use]
    pub fn queries(mut self, queries: Vec<Query>) -> Self {
        self.config.queries = queries;
        self
    }

    #[must_use]
    pub fn query(mut self, query: Query) -> Self {
        self.config.queries.push(query);
        self
    }

    #[must_use]
    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    #[must_use]
    pub fn search_url<S: Into<String>>(mut self, template: S) -> Self {
        self.config.search_url = template.into();
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    #[must_use]
    pub fn clear_existing(mut self, clear: bool) -> Self {
        self.config.clear_existing = clear;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`CollectConfig::validate`]
    pub fn build(self) -> Result<CollectConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
