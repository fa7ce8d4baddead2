//! Segmentation model downloads from `HuggingFace` repositories
//!
//! Files are streamed into a hidden staging directory inside the cache and the
//! directory is renamed into place once every download finished, so a model
//! directory is either complete or absent.

use crate::cache::ModelCache;
use crate::error::{DatasetError, Result};
use crate::tracing_config::{events, spans};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::Instrument;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Preprocessing parameters; optional, defaults apply when missing
const PREPROCESSOR_FILE: &str = "preprocessor_config.json";

/// ONNX variants to fetch; at least one must succeed
const ONNX_FILES: &[(&str, &str)] = &[
    ("onnx/model.onnx", "fp32"),
    ("onnx/model_fp16.onnx", "fp16"),
];

/// Download progress display that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Byte progress bar when the CLI is built, silent otherwise
    #[must_use]
    pub fn bytes() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => drop(msg),
        }
    }

    fn set_progress(&self, position: u64, length: Option<u64>) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => {
                if let Some(length) = length {
                    pb.set_length(length);
                }
                pb.set_position(position);
            },
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => drop(msg),
        }
    }
}

/// Downloads models into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    endpoint: String,
}

impl ModelDownloader {
    /// # Errors
    /// - The HTTP client cannot be built
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| DatasetError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            endpoint: HUGGINGFACE_PREFIX.to_string(),
        })
    }

    /// Fetch repository files from a mirror instead of `huggingface.co`
    ///
    /// Model URLs still name `HuggingFace` repositories; only the host the
    /// files are requested from changes.
    #[must_use]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download a `HuggingFace` model repository and return its model id
    ///
    /// An already cached model is reused unless `force` is set. With
    /// `expected_sha256`, only ONNX variants whose digest matches are kept.
    ///
    /// # Errors
    /// - The URL is not a `HuggingFace` repository URL
    /// - No ONNX variant could be downloaded, or none matches `expected_sha256`
    /// - The staging directory cannot be created or moved into place
    pub async fn download_model(
        &self,
        url: &str,
        force: bool,
        expected_sha256: Option<&str>,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        validate_model_url(url)?;
        let model_id = ModelCache::url_to_model_id(url);

        if !force && self.cache.is_model_cached(&model_id) {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        let staging = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(self.cache.cache_dir())
            .map_err(|e| {
                DatasetError::file_io_error("create staging directory", self.cache.cache_dir(), &e)
            })?;

        let span = spans::download(url, staging.path());
        let result = self
            .download_model_files(url, staging.path(), expected_sha256, progress)
            .instrument(span)
            .await;

        if let Err(e) = result {
            progress.finish_with_message("Download failed".to_string());
            return Err(e);
        }

        let final_dir = self.cache.model_path(&model_id);
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir).map_err(|e| {
                DatasetError::file_io_error("remove existing model directory", &final_dir, &e)
            })?;
        }
        fs::rename(staging.path(), &final_dir).map_err(|e| {
            DatasetError::file_io_error("move downloaded model into cache", &final_dir, &e)
        })?;

        progress.finish_with_message(format!("Downloaded {}", model_id));
        log::info!("Cached model {} at {}", model_id, final_dir.display());
        Ok(model_id)
    }

    async fn download_model_files(
        &self,
        model_url: &str,
        target: &Path,
        expected_sha256: Option<&str>,
        progress: &ProgressIndicator,
    ) -> Result<()> {
        let repo_path = model_url
            .strip_prefix(HUGGINGFACE_PREFIX)
            .unwrap_or(model_url)
            .trim_end_matches('/');
        let raw_base = format!("{}{}/resolve/main/", self.endpoint, repo_path);

        progress.set_message(format!("Downloading {}", PREPROCESSOR_FILE));
        let preprocessor_url = format!("{}{}", raw_base, PREPROCESSOR_FILE);
        if let Err(e) = self
            .download_file(&preprocessor_url, &target.join(PREPROCESSOR_FILE), progress)
            .await
        {
            log::warn!("No {} available, model defaults will apply: {}", PREPROCESSOR_FILE, e);
        }

        let mut downloaded = 0;
        let mut rejected = 0;
        for (file_path, variant) in ONNX_FILES {
            progress.set_message(format!("Downloading {} model", variant));
            let local_path = target.join(file_path);
            let file_url = format!("{}{}", raw_base, file_path);
            if let Err(e) = self.download_file(&file_url, &local_path, progress).await {
                log::warn!("Failed to download {} variant: {}", variant, e);
                continue;
            }

            if let Some(expected) = expected_sha256 {
                if !verify_file_integrity(&local_path, expected)? {
                    rejected += 1;
                    fs::remove_file(&local_path).map_err(|e| {
                        DatasetError::file_io_error("remove rejected model file", &local_path, &e)
                    })?;
                    continue;
                }
            }

            downloaded += 1;
            log::info!("Downloaded {} model variant", variant);
        }

        if downloaded == 0 && rejected > 0 {
            return Err(DatasetError::model(format!(
                "No ONNX model variant from {} matches SHA-256 {}",
                model_url,
                expected_sha256.unwrap_or_default()
            )));
        }
        if downloaded == 0 {
            return Err(DatasetError::model(format!(
                "No ONNX model variant could be downloaded from {}",
                model_url
            )));
        }

        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DatasetError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DatasetError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(DatasetError::network_error(
                format!("Failed to download {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| DatasetError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| DatasetError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| DatasetError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_progress(downloaded, total_size);
        }

        file.flush()
            .await
            .map_err(|e| DatasetError::file_io_error("flush file", local_path, &e))?;

        events::download_progress(url, downloaded, total_size);
        Ok(())
    }
}

/// Check a file against an expected SHA-256 hex digest
///
/// # Errors
/// - The file cannot be read
pub fn verify_file_integrity(file_path: &Path, expected_hash: &str) -> Result<bool> {
    let contents = fs::read(file_path)
        .map_err(|e| DatasetError::file_io_error("read file for verification", file_path, &e))?;

    let actual = format!("{:x}", Sha256::digest(&contents));
    if actual.eq_ignore_ascii_case(expected_hash.trim()) {
        Ok(true)
    } else {
        log::warn!(
            "Integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected_hash,
            actual
        );
        Ok(false)
    }
}

/// Validate that a URL names a `HuggingFace` repository (`user/repo`)
///
/// # Errors
/// - Empty URL, other host, or missing user or repository
pub fn validate_model_url(url: &str) -> Result<()> {
    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_PREFIX) else {
        return Err(DatasetError::invalid_config(format!(
            "Unsupported model URL '{}'. Only HuggingFace repositories are supported ({}user/repo)",
            url, HUGGINGFACE_PREFIX
        )));
    };

    let mut parts = repo_path.trim_end_matches('/').split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(repo), None) if !user.is_empty() && !repo.is_empty() => Ok(()),
        _ => Err(DatasetError::invalid_config(format!(
            "Invalid HuggingFace repository URL '{}'. Expected {}user/repo",
            url, HUGGINGFACE_PREFIX
        ))),
    }
}
