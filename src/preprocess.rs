//! Resumable preprocessing of a dataset tree
//!
//! Each source image goes through background removal, subject framing and
//! JPEG encoding. The output is written to a temporary sibling and renamed
//! into place before the file name is appended to the processed-image log,
//! so an interrupted run never records a file whose output is missing.

use crate::checkpoint::ProcessedLog;
use crate::config::PreprocessConfig;
use crate::dataset::{discover_images, log_key, output_path};
use crate::error::{DatasetError, Result};
use crate::framing::{frame_subject, FramingInfo};
use crate::progress::{BatchKind, ItemOutcome, NoOpProgressReporter, ProgressReporter};
use crate::removal::BackgroundRemover;
use crate::tracing_config::{events, spans};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A source image that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a preprocessing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Source images matching the pattern
    pub discovered: usize,
    /// Written during this run
    pub processed: usize,
    /// Already present in the log
    pub skipped: usize,
    pub failed: Vec<FailedItem>,
}

/// Result of processing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub output: PathBuf,
    pub framing: FramingInfo,
}

/// Walks the dataset tree and preprocesses every image not yet logged
pub struct Preprocessor {
    config: PreprocessConfig,
    remover: Box<dyn BackgroundRemover>,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("config", &self.config)
            .field("remover", &self.remover.name())
            .finish_non_exhaustive()
    }
}

impl Preprocessor {
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: PreprocessConfig, remover: Box<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            remover,
            progress: Arc::new(NoOpProgressReporter),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Process every unlogged image under the input directory
    ///
    /// Per-file failures are reported and left out of the log so a later run
    /// retries them.
    ///
    /// # Errors
    /// - The log cannot be opened or appended to
    /// - The output directory cannot be created
    /// - The input directory cannot be walked
    pub fn run(&self) -> Result<PreprocessReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut log = ProcessedLog::open(&self.config.log_path)?;
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            DatasetError::file_io_error("create output directory", &self.config.output_dir, &e)
        })?;

        let sources = discover_images(&self.config.input_dir, &self.config.pattern)?;
        log::info!(
            "🔍 Found {} images in {} ({} already processed, remover: {})",
            sources.len(),
            self.config.input_dir.display(),
            log.len(),
            self.remover.name()
        );

        let label = self.config.input_dir.display().to_string();
        self.progress
            .batch_started(BatchKind::Preprocess, &label, sources.len());

        let mut processed = 0;
        let mut skipped = 0;
        let mut failed = Vec::new();

        for source in &sources {
            let display = source.display().to_string();
            let key = match log_key(source) {
                Ok(key) => key,
                Err(e) => {
                    events::item_skipped(&display, &e);
                    failed.push(FailedItem {
                        path: source.clone(),
                        reason: e.to_string(),
                    });
                    self.progress
                        .item_finished(BatchKind::Preprocess, &display, ItemOutcome::Failed);
                    continue;
                },
            };

            if log.contains(key) {
                log::debug!("Already processed: {}", key);
                skipped += 1;
                self.progress
                    .item_finished(BatchKind::Preprocess, &display, ItemOutcome::Skipped);
                continue;
            }

            let _span = spans::preprocess_file(source).entered();
            let file_start = Instant::now();
            match self.process_file(source) {
                Ok(result) => {
                    log.record(key)?;
                    processed += 1;
                    log::debug!(
                        "Wrote {} ({}x{} subject at {:?})",
                        result.output.display(),
                        result.framing.placement.size.0,
                        result.framing.placement.size.1,
                        result.framing.placement.offset
                    );
                    events::performance_metric(
                        "preprocess_file",
                        file_start.elapsed().as_millis() as u64,
                    );
                    self.progress.item_finished(
                        BatchKind::Preprocess,
                        &display,
                        ItemOutcome::Completed,
                    );
                },
                Err(e) => {
                    events::item_skipped(&display, &e);
                    failed.push(FailedItem {
                        path: source.clone(),
                        reason: e.to_string(),
                    });
                    self.progress
                        .item_finished(BatchKind::Preprocess, &display, ItemOutcome::Failed);
                },
            }
        }

        self.progress.batch_finished(BatchKind::Preprocess, &label);

        let report = PreprocessReport {
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            discovered: sources.len(),
            processed,
            skipped,
            failed,
        };
        log::info!(
            "✅ Preprocessing finished: {} processed, {} skipped, {} failed in {}ms",
            report.processed,
            report.skipped,
            report.failed.len(),
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Preprocess one image and write it to its mirrored output path
    ///
    /// Does not touch the log.
    ///
    /// # Errors
    /// - `EmptySubject` when the image is entirely background
    /// - `Processing` naming the failed stage (decode, removal, framing,
    ///   encode) for everything else
    pub fn process_file(&self, source: &Path) -> Result<ProcessedImage> {
        let image = image::open(source).map_err(|e| stage_error("decode", source, &e.into()))?;
        let foreground = self
            .remover
            .remove_background(&image)
            .map_err(|e| stage_error("removal", source, &e))?;
        let (framed, framing) =
            frame_subject(&foreground, self.config.canvas).map_err(|e| match e {
                DatasetError::EmptySubject(_) => e,
                other => stage_error("framing", source, &other),
            })?;

        let output = output_path(
            source,
            &self.config.input_dir,
            &self.config.output_dir,
            self.config.preserve_hierarchy,
        )?;
        write_jpeg_atomically(&framed, &output, self.config.jpeg_quality)
            .map_err(|e| stage_error("encode", source, &e))?;

        Ok(ProcessedImage { output, framing })
    }
}

fn stage_error(stage: &str, source: &Path, cause: &DatasetError) -> DatasetError {
    DatasetError::processing_stage_error(
        stage,
        &cause.to_string(),
        Some(&source.display().to_string()),
    )
}

/// Encode to a temporary sibling of `path`, then rename over it
fn write_jpeg_atomically(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        DatasetError::processing(format!("{} has no parent directory", path.display()))
    })?;
    std::fs::create_dir_all(parent)
        .map_err(|e| DatasetError::file_io_error("create output directory", parent, &e))?;

    let temp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".jpg")
        .tempfile_in(parent)
        .map_err(|e| DatasetError::file_io_error("create temporary file", parent, &e))?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        JpegEncoder::new_with_quality(&mut writer, quality).encode_image(image)?;
        writer
            .flush()
            .map_err(|e| DatasetError::file_io_error("write image", temp.path(), &e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| DatasetError::file_io_error("sync image", temp.path(), &e))?;

    temp.persist(path)
        .map_err(|e| DatasetError::file_io_error("move image into place", path, &e.error))?;
    Ok(())
}
