//! Car dataset CLI tool
//!
//! Collects car images from web image search, preprocesses them into a
//! training dataset and manages the segmentation model cache.

use super::config::CliConfigBuilder;
use super::progress::IndicatifReporter;
use crate::{
    cache::{format_size, ModelCache, CACHE_DIR_ENV, DEFAULT_MODEL_URL},
    collect::Collector,
    download::{validate_model_url, ModelDownloader, ProgressIndicator},
    preprocess::Preprocessor,
    removal::{BackgroundRemover, KeyColorRemover, DEFAULT_TOLERANCE},
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Car image dataset builder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "car-dataset")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit compact uncolored log lines
    #[arg(long, global = true)]
    pub plain: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download search result images into one directory per query
    Collect(CollectArgs),
    /// Remove backgrounds and frame every image on a fixed canvas
    Preprocess(PreprocessArgs),
    /// Manage cached segmentation models
    #[command(subcommand)]
    Model(ModelCommand),
}

#[derive(Args, Debug, Default)]
pub struct CollectArgs {
    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Search query (repeatable) [default: built-in car list]
    #[arg(short, long = "query", value_name = "QUERY")]
    pub queries: Vec<String>,

    /// Dataset root directory [default: data]
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Download workers per query [default: 32]
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Result pages requested per query [default: 5]
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Results page URL template with {query} and {start} placeholders
    #[arg(long, value_name = "TEMPLATE")]
    pub search_url: Option<String>,

    /// Keep files already present in query directories
    #[arg(long)]
    pub keep_existing: bool,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum RemoverKind {
    /// ONNX salient-object segmentation model
    #[default]
    Segmentation,
    /// Key out the backdrop colour sampled from the image corners
    KeyColor,
}

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Dataset root directory
    #[arg(short, long, default_value = "data", value_name = "DIR")]
    pub input: PathBuf,

    /// Output root directory
    #[arg(short, long, default_value = "preprocessed data", value_name = "DIR")]
    pub output: PathBuf,

    /// Processed-image log
    #[arg(long, default_value = "processed_images.log", value_name = "FILE")]
    pub log: PathBuf,

    /// Canvas width
    #[arg(long, default_value_t = 448)]
    pub width: u32,

    /// Canvas height
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// File name pattern selecting source images
    #[arg(long, default_value = "*.jpg")]
    pub pattern: String,

    /// Background removal method
    #[arg(long, value_enum, default_value_t = RemoverKind::Segmentation)]
    pub remover: RemoverKind,

    /// Model id, `HuggingFace` URL, or model directory [default: isnet-general-onnx]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model variant [default: fp32, then fp16]
    #[arg(long, value_parser = ["fp32", "fp16"])]
    pub variant: Option<String>,

    /// Per-channel tolerance for the key-color remover
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: u8,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 75)]
    pub jpeg_quality: u8,

    /// Mirror the full relative path instead of only the category directory
    #[arg(long)]
    pub preserve_hierarchy: bool,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Download a model repository into the cache
    Download {
        /// `HuggingFace` repository URL
        #[arg(default_value = DEFAULT_MODEL_URL)]
        url: String,
        /// Download again even if cached
        #[arg(long)]
        force: bool,
        /// Expected SHA-256 of the ONNX file; variants that differ are discarded
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },
    /// List cached models
    List,
    /// Remove one cached model, or all of them
    Clear {
        /// Model id to remove
        id: Option<String>,
    },
    /// Print the cache directory
    CacheDir,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.plain).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Collect(args) => run_collect(&args).await,
        Command::Preprocess(args) => run_preprocess(args).await,
        Command::Model(command) => run_model_command(command).await,
    }
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose: u8, plain: bool) -> Result<()> {
    let format = if plain {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };

    TracingConfig::new()
        .with_verbosity(verbose)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
        .context("Failed to initialize tracing subscriber")
}

async fn run_collect(args: &CollectArgs) -> Result<()> {
    let config = CliConfigBuilder::collect_config(args).context("Invalid collect options")?;

    info!(
        "🚗 Collecting {} queries into {} with {} workers",
        config.queries.len(),
        config.data_dir.display(),
        config.workers
    );

    let collector = Collector::new(config)
        .context("Failed to create collector")?
        .with_progress(Arc::new(IndicatifReporter::new()));
    let report = collector.run().await.context("Collection failed")?;

    info!(
        "📊 Downloaded {} images ({} failed) in {:.2}s",
        report.total_downloaded(),
        report.total_failed(),
        report.elapsed_ms as f64 / 1000.0
    );
    for query in report.queries.iter().filter(|q| q.error.is_some()) {
        warn!(
            "Query '{}' failed: {}",
            query.query,
            query.error.as_deref().unwrap_or_default()
        );
    }

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    Ok(())
}

async fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    let config = CliConfigBuilder::preprocess_config(&args).context("Invalid preprocess options")?;
    let remover = build_remover(&args).await?;

    info!(
        "🖼️  Preprocessing {} -> {} on a {} canvas",
        config.input_dir.display(),
        config.output_dir.display(),
        config.canvas
    );

    let preprocessor = Preprocessor::new(config, remover)
        .context("Failed to create preprocessor")?
        .with_progress(Arc::new(IndicatifReporter::new()));

    let report = tokio::task::spawn_blocking(move || preprocessor.run())
        .await
        .context("Preprocessing task panicked")?
        .context("Preprocessing failed")?;

    info!(
        "📊 {} processed, {} already done, {} failed in {:.2}s",
        report.processed,
        report.skipped,
        report.failed.len(),
        report.elapsed_ms as f64 / 1000.0
    );
    for failure in &report.failed {
        warn!("  ❌ {}: {}", failure.path.display(), failure.reason);
    }

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    Ok(())
}

async fn build_remover(args: &PreprocessArgs) -> Result<Box<dyn BackgroundRemover>> {
    match args.remover {
        RemoverKind::KeyColor => Ok(Box::new(KeyColorRemover::new(args.tolerance))),
        RemoverKind::Segmentation => build_segmentation_remover(args).await,
    }
}

#[cfg(feature = "tract")]
async fn build_segmentation_remover(args: &PreprocessArgs) -> Result<Box<dyn BackgroundRemover>> {
    use crate::models::{ModelSource, SegmentationModel};
    use crate::removal::SegmentationRemover;

    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let source = args
        .model
        .as_deref()
        .map_or_else(ModelSource::default, ModelSource::parse);

    ensure_model_available(&source, &cache).await?;

    let model = SegmentationModel::resolve(&source, args.variant.as_deref(), &cache)
        .context("Failed to resolve segmentation model")?;
    let remover = tokio::task::spawn_blocking(move || SegmentationRemover::load(&model))
        .await
        .context("Model loading task panicked")?
        .context("Failed to load segmentation model")?;
    Ok(Box::new(remover))
}

#[cfg(not(feature = "tract"))]
async fn build_segmentation_remover(
    _args: &PreprocessArgs,
) -> Result<Box<dyn BackgroundRemover>> {
    anyhow::bail!(
        "Segmentation support not compiled in. Rebuild with --features tract or use --remover key-color"
    )
}

/// Download the default model on first use
#[cfg(feature = "tract")]
async fn ensure_model_available(
    source: &crate::models::ModelSource,
    cache: &ModelCache,
) -> Result<()> {
    use crate::models::ModelSource;

    let ModelSource::Cached(model_id) = source else {
        return Ok(());
    };
    if cache.is_model_cached(model_id) {
        return Ok(());
    }
    if *model_id != ModelCache::default_model_id() {
        anyhow::bail!(
            "Model '{}' is not cached. Download it with `car-dataset model download <URL>`",
            model_id
        );
    }

    println!("📦 Model not cached. Auto-downloading default model...");
    let downloader =
        ModelDownloader::new(cache.clone()).context("Failed to create model downloader")?;
    let progress = ProgressIndicator::bytes();
    downloader
        .download_model(DEFAULT_MODEL_URL, false, None, &progress)
        .await
        .context("Failed to download default model")?;
    println!("✅ Model downloaded successfully!");
    Ok(())
}

async fn run_model_command(command: ModelCommand) -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;

    match command {
        ModelCommand::Download { url, force, sha256 } => {
            validate_model_url(&url).context("Invalid model URL")?;
            println!("📦 Downloading model from: {}", url);

            let downloader =
                ModelDownloader::new(cache).context("Failed to create model downloader")?;
            let progress = ProgressIndicator::bytes();
            let model_id = downloader
                .download_model(&url, force, sha256.as_deref(), &progress)
                .await
                .context("Failed to download model")?;

            println!("✅ Model ID: {}", model_id);
            println!(
                "   Cache location: {}",
                downloader.cache().model_path(&model_id).display()
            );
            println!("\n💡 To use this model:");
            println!("   car-dataset preprocess --model {}", model_id);
        },
        ModelCommand::List => list_cached_models(&cache)?,
        ModelCommand::Clear { id: Some(id) } => {
            if cache
                .clear_model(&id)
                .with_context(|| format!("Failed to clear model '{}'", id))?
            {
                println!("🗑️  Removed model: {}", id);
            } else {
                println!("⚠️  Model '{}' not found in cache", id);
            }
        },
        ModelCommand::Clear { id: None } => {
            let removed = cache.clear_all().context("Failed to clear cache")?;
            if removed.is_empty() {
                println!("💡 Cache was already empty");
            } else {
                println!("🗑️  Removed {} model(s):", removed.len());
                for id in &removed {
                    println!("   • {}", id);
                }
            }
        },
        ModelCommand::CacheDir => {
            println!("📁 {}", cache.cache_dir().display());
            if std::env::var_os(CACHE_DIR_ENV).is_some() {
                println!("   Source: {} environment variable", CACHE_DIR_ENV);
            } else {
                println!("   Source: user cache directory");
            }
        },
    }

    Ok(())
}

fn list_cached_models(cache: &ModelCache) -> Result<()> {
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model, use:");
        println!("  car-dataset model download");
        return Ok(());
    }

    println!("📦 Cached Models");
    for model in models {
        println!("📁 {}", model.model_id);
        println!("  └─ Location: {}", model.path.display());
        println!("  └─ Variants: {}", model.variants.join(", "));
        println!("  └─ Size: {}", format_size(model.size_bytes));
        if !model.has_preprocessor {
            println!("  └─ ⚠️  No preprocessor config, defaults apply");
        }
    }
    Ok(())
}

fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("📝 Report written to {}", path.display());
    Ok(())
}
