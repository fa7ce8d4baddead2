//! Image collection from web image search
//!
//! For each query the collector discovers result image elements, splits them
//! statically across a fixed pool of download workers and writes every image
//! into the query's directory as `img_<n>.<ext>`. File numbers come from one
//! run-wide [`IndexAllocator`], so they never repeat within a run.

pub mod discovery;
pub mod query;
pub mod source;
pub mod workers;

pub use discovery::{HtmlResultsFinder, ImageFinder};
pub use query::Query;
pub use source::{mime_extension, ImageAsset, ImageElement, ImageSource};
pub use workers::{partition_static, IndexAllocator, WorkerOutcome};

use crate::config::CollectConfig;
use crate::error::{DatasetError, Result};
use crate::progress::{BatchKind, NoOpProgressReporter, ProgressReporter};
use crate::tracing_config::spans;
use chrono::{DateTime, Utc};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::Instrument;
use workers::{download_slice, WorkerContext};

/// Outcome of one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReport {
    pub query: String,
    pub directory: PathBuf,
    /// Elements found by discovery
    pub discovered: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Discovery error that prevented any download for this query
    pub error: Option<String>,
}

/// Outcome of a collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub queries: Vec<QueryReport>,
}

impl CollectReport {
    #[must_use]
    pub fn total_downloaded(&self) -> usize {
        self.queries.iter().map(|q| q.downloaded).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.queries.iter().map(|q| q.failed).sum()
    }
}

/// Runs collection queries one after another
pub struct Collector {
    config: CollectConfig,
    client: reqwest::Client,
    finder: Arc<dyn ImageFinder>,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Collector that discovers images through HTML results pages
    ///
    /// # Errors
    /// - Invalid configuration
    /// - The HTTP client cannot be built
    pub fn new(config: CollectConfig) -> Result<Self> {
        let client = build_client(&config)?;
        let finder = HtmlResultsFinder::new(client.clone(), &config.search_url, config.max_pages);
        Self::assemble(config, client, Arc::new(finder))
    }

    /// Collector with a custom discovery implementation
    ///
    /// # Errors
    /// - Invalid configuration
    /// - The HTTP client cannot be built
    pub fn with_finder(config: CollectConfig, finder: Arc<dyn ImageFinder>) -> Result<Self> {
        let client = build_client(&config)?;
        Self::assemble(config, client, finder)
    }

    fn assemble(
        config: CollectConfig,
        client: reqwest::Client,
        finder: Arc<dyn ImageFinder>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            finder,
            progress: Arc::new(NoOpProgressReporter),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn config(&self) -> &CollectConfig {
        &self.config
    }

    /// Run every configured query in order
    ///
    /// Discovery and per-image failures are logged and recorded in the report.
    ///
    /// # Errors
    /// - A query directory cannot be cleared or created
    /// - A download worker panics
    pub async fn run(&self) -> Result<CollectReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let allocator = Arc::new(IndexAllocator::new());

        tokio::fs::create_dir_all(&self.config.data_dir)
            .await
            .map_err(|e| {
                DatasetError::file_io_error("create dataset directory", &self.config.data_dir, &e)
            })?;

        let mut queries = Vec::with_capacity(self.config.queries.len());
        for query in &self.config.queries {
            let directory_name = query.directory_name();
            let span = spans::collect_query(query.text(), &directory_name);
            let report = self
                .collect_query(query, &allocator)
                .instrument(span)
                .await?;

            log::info!(
                "'{}': {} discovered, {} downloaded, {} failed",
                query,
                report.discovered,
                report.downloaded,
                report.failed
            );
            queries.push(report);
        }

        Ok(CollectReport {
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
            queries,
        })
    }

    async fn collect_query(
        &self,
        query: &Query,
        allocator: &Arc<IndexAllocator>,
    ) -> Result<QueryReport> {
        let directory = self.config.data_dir.join(query.directory_name());
        prepare_directory(&directory, self.config.clear_existing).await?;

        let mut report = QueryReport {
            query: query.text().to_string(),
            directory: directory.clone(),
            discovered: 0,
            downloaded: 0,
            failed: 0,
            error: None,
        };

        let elements = match self.finder.find_images(query).await {
            Ok(elements) => elements,
            Err(e) => {
                log::warn!("Discovery failed for '{}': {}", query, e);
                report.error = Some(e.to_string());
                return Ok(report);
            },
        };
        report.discovered = elements.len();

        self.progress
            .batch_started(BatchKind::Download, query.text(), elements.len());

        let context = Arc::new(WorkerContext {
            client: self.client.clone(),
            directory,
            allocator: Arc::clone(allocator),
            progress: Arc::clone(&self.progress),
        });

        let mut tasks = JoinSet::new();
        for (worker, range) in partition_static(elements.len(), self.config.workers)
            .into_iter()
            .enumerate()
        {
            if range.is_empty() {
                continue;
            }
            let slice = elements.get(range).map(<[ImageElement]>::to_vec).unwrap_or_default();
            let span = spans::download_worker(worker, slice.len());
            tasks.spawn(download_slice(Arc::clone(&context), slice).instrument(span));
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| DatasetError::processing(format!("download worker failed: {}", e)))?;
            report.downloaded += outcome.downloaded;
            report.failed += outcome.failed;
        }

        self.progress.batch_finished(BatchKind::Download, query.text());
        Ok(report)
    }
}

fn build_client(config: &CollectConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| DatasetError::network_error("Failed to create HTTP client", e))
}

/// Make sure the query directory exists, optionally emptied first
async fn prepare_directory(directory: &Path, clear_existing: bool) -> Result<()> {
    if clear_existing {
        match tokio::fs::remove_dir_all(directory).await {
            Ok(()) => log::debug!("Cleared {}", directory.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(DatasetError::file_io_error("clear directory", directory, &e)),
        }
    }

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| DatasetError::file_io_error("create directory", directory, &e))
}
