#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Car Dataset
//!
//! Builds a car image training dataset in two independent batch jobs.
//!
//! - **Collection**: discovers image results for each search query and
//!   downloads them with a fixed pool of workers into `data/<query>/img_<n>.<ext>`.
//! - **Preprocessing**: removes the background of every image, crops to the
//!   subject, scales it to fit a fixed canvas and centers it on black. A
//!   processed-image log makes the job resumable.
//!
//! Background removal is pluggable through [`BackgroundRemover`]. The
//! segmentation remover (feature `tract`) runs an `ISNet` ONNX model in pure
//! Rust; models are downloaded from `HuggingFace` into a per-user cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use car_dataset::{KeyColorRemover, PreprocessConfig, Preprocessor};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = PreprocessConfig::builder()
//!     .input_dir("data")
//!     .output_dir("preprocessed data")
//!     .canvas(448, 256)
//!     .build()?;
//!
//! let report = Preprocessor::new(config, Box::new(KeyColorRemover::default()))?.run()?;
//! println!("{} processed, {} skipped", report.processed, report.skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use car_dataset::{CollectConfig, Collector, Query};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CollectConfig::builder()
//!     .query(Query::with_directory("Koenigsegg One:1", "Koenigsegg One_1"))
//!     .workers(8)
//!     .build()?;
//!
//! let report = Collector::new(config)?.run().await?;
//! println!("{} images downloaded", report.total_downloaded());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): segmentation-based background removal
//! - `cli` (default): command-line interface and progress bars
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod cache;
pub mod checkpoint;
#[cfg(feature = "cli")]
pub mod cli;
pub mod collect;
pub mod config;
pub mod dataset;
pub mod download;
pub mod error;
pub mod framing;
pub mod models;
pub mod preprocess;
pub mod progress;
pub mod removal;
pub mod tracing_config;

pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use checkpoint::ProcessedLog;
pub use collect::{
    CollectReport, Collector, HtmlResultsFinder, ImageElement, ImageFinder, ImageSource, Query,
    QueryReport,
};
pub use config::{CollectConfig, PreprocessConfig};
pub use download::{validate_model_url, ModelDownloader, ProgressIndicator};
pub use error::{DatasetError, Result};
pub use framing::{
    find_subject_bounds, frame_subject, resize_and_center, BoundingBox, CanvasSize, FramingInfo,
    Placement,
};
pub use models::{ModelSource, PreprocessingConfig, SegmentationModel};
pub use preprocess::{FailedItem, PreprocessReport, Preprocessor};
pub use progress::{BatchKind, ItemOutcome, NoOpProgressReporter, ProgressReporter};
pub use removal::{BackgroundRemover, KeyColorRemover};
#[cfg(feature = "tract")]
pub use removal::SegmentationRemover;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
