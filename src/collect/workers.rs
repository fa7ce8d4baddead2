//! Static work partitioning, index allocation and the download worker

use super::source::{mime_extension, ImageAsset, ImageElement, ImageSource};
use crate::error::{DatasetError, Result};
use crate::progress::{BatchKind, ItemOutcome, ProgressReporter};
use crate::tracing_config::events;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Split `len` items into `workers` contiguous slices
///
/// Every slice holds `len / workers` items and the last one also takes the
/// remainder. With fewer items than workers all but the last slice are empty.
#[must_use]
pub fn partition_static(len: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }

    let per_worker = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * per_worker;
            let end = if i == workers - 1 {
                len
            } else {
                start + per_worker
            };
            start..end
        })
        .collect()
}

/// Run-wide issuer of image file numbers
///
/// Numbers start at 1 and are unique across all workers and queries of a run.
#[derive(Debug, Default)]
pub struct IndexAllocator {
    issued: AtomicU64,
}

impl IndexAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next file number
    pub fn next_index(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// How many numbers have been handed out
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

/// Counts produced by one worker
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub downloaded: usize,
    pub failed: usize,
}

/// State shared by the workers of one query
pub(crate) struct WorkerContext {
    pub(crate) client: reqwest::Client,
    pub(crate) directory: PathBuf,
    pub(crate) allocator: Arc<IndexAllocator>,
    pub(crate) progress: Arc<dyn ProgressReporter>,
}

/// Download every element of a slice, skipping failures
pub(crate) async fn download_slice(
    context: Arc<WorkerContext>,
    elements: Vec<ImageElement>,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();

    for element in elements {
        let label = element.source_attribute().map_or_else(
            || "<missing source>".to_string(),
            |value| truncate_for_log(value).to_string(),
        );

        match download_one(&context, &element).await {
            Ok(path) => {
                log::debug!("Saved {}", path.display());
                outcome.downloaded += 1;
                context
                    .progress
                    .item_finished(BatchKind::Download, &label, ItemOutcome::Completed);
            },
            Err(e) => {
                events::item_skipped(&label, &e);
                outcome.failed += 1;
                context
                    .progress
                    .item_finished(BatchKind::Download, &label, ItemOutcome::Failed);
            },
        }
    }

    outcome
}

async fn download_one(context: &WorkerContext, element: &ImageElement) -> Result<PathBuf> {
    let source = element.resolve()?;
    let asset = fetch_asset(&context.client, source).await?;
    let index = context.allocator.next_index();
    write_asset(&context.directory, index, &asset).await
}

/// Obtain the bytes and extension for a resolved source
///
/// # Errors
/// - The request fails or returns a non-success status
/// - The declared content type is missing or not a known image type
pub async fn fetch_asset(client: &reqwest::Client, source: ImageSource) -> Result<ImageAsset> {
    match source {
        ImageSource::Inline { mime, data } => {
            let extension = mime_extension(&mime)
                .ok_or_else(|| DatasetError::unsupported_content_type(mime.clone()))?;
            Ok(ImageAsset {
                bytes: data,
                extension,
            })
        },
        ImageSource::Remote(url) => {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| DatasetError::network_error(format!("Failed to fetch {}", url), e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DatasetError::network_error(
                    format!("Failed to fetch {}", url),
                    format!("HTTP {}", status),
                ));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let extension = mime_extension(&content_type).ok_or_else(|| {
                DatasetError::unsupported_content_type(if content_type.is_empty() {
                    "<missing>".to_string()
                } else {
                    content_type.clone()
                })
            })?;

            let bytes = response
                .bytes()
                .await
                .map_err(|e| DatasetError::network_error(format!("Failed to read {}", url), e))?;

            Ok(ImageAsset {
                bytes: bytes.to_vec(),
                extension,
            })
        },
    }
}

/// Write an asset as `img_<index>.<ext>` under `directory`
///
/// # Errors
/// - The file cannot be written
pub async fn write_asset(directory: &Path, index: u64, asset: &ImageAsset) -> Result<PathBuf> {
    let path = directory.join(format!("img_{}.{}", index, asset.extension));
    tokio::fs::write(&path, &asset.bytes)
        .await
        .map_err(|e| DatasetError::file_io_error("write image", &path, &e))?;
    Ok(path)
}

/// Keep data URIs from flooding the log
fn truncate_for_log(value: &str) -> &str {
    const MAX: usize = 96;
    if value.len() <= MAX {
        return value;
    }
    let mut end = MAX;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value.get(..end).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_partition_covers_every_item_once() {
        for &(len, workers) in &[(0usize, 4usize), (3, 32), (32, 32), (100, 32), (101, 7), (5, 1)] {
            let ranges = partition_static(len, workers);
            assert_eq!(ranges.len(), workers);

            let mut covered = Vec::new();
            for range in &ranges {
                covered.extend(range.clone());
            }
            assert_eq!(covered, (0..len).collect::<Vec<_>>(), "{len}/{workers}");
        }
    }

    #[test]
    fn test_partition_last_worker_takes_remainder() {
        let ranges = partition_static(100, 32);
        assert_eq!(ranges[0], 0..3);
        assert_eq!(ranges[30], 90..93);
        assert_eq!(ranges[31], 93..100);

        let ranges = partition_static(3, 32);
        assert!(ranges[..31].iter().all(|r| r.is_empty()));
        assert_eq!(ranges[31], 0..3);
    }

    #[test]
    fn test_partition_without_workers() {
        assert!(partition_static(10, 0).is_empty());
    }

    #[test]
    fn test_index_allocator_starts_at_one() {
        let allocator = IndexAllocator::new();
        assert_eq!(allocator.next_index(), 1);
        assert_eq!(allocator.next_index(), 2);
        assert_eq!(allocator.issued(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_index_allocator_is_unique_and_gap_free_under_concurrency() {
        let allocator = Arc::new(IndexAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let allocator = Arc::clone(&allocator);
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                for _ in 0..250 {
                    taken.push(allocator.next_index());
                    tokio::task::yield_now().await;
                }
                taken
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for index in handle.await.unwrap() {
                assert!(all.insert(index), "duplicate index {index}");
            }
        }
        assert_eq!(all.len(), 4000);
        assert_eq!(all.iter().min(), Some(&1));
        assert_eq!(all.iter().max(), Some(&4000));
    }

    #[tokio::test]
    async fn test_fetch_inline_asset_maps_jpeg_to_jpg() {
        let client = reqwest::Client::new();
        let source = ImageSource::parse("data:image/jpeg;base64,/9j/4AA=").unwrap();
        let asset = fetch_asset(&client, source).await.unwrap();
        assert_eq!(asset.extension, "jpg");
        assert_eq!(asset.bytes, vec![0xff, 0xd8, 0xff, 0xe0, 0x00]);
    }

    #[tokio::test]
    async fn test_fetch_inline_asset_rejects_non_image() {
        let client = reqwest::Client::new();
        let source = ImageSource::Inline {
            mime: "text/plain".to_string(),
            data: b"hello".to_vec(),
        };
        assert!(matches!(
            fetch_asset(&client, source).await,
            Err(DatasetError::UnsupportedContentType(_))
        ));
    }

    #[tokio::test]
    async fn test_write_asset_names_file_by_index() {
        let dir = tempdir().unwrap();
        let asset = ImageAsset {
            bytes: vec![1, 2, 3],
            extension: "png",
        };
        let path = write_asset(dir.path(), 7, &asset).await.unwrap();
        assert_eq!(path, dir.path().join("img_7.png"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let long = "é".repeat(100);
        let truncated = truncate_for_log(&long);
        assert!(truncated.len() <= 96);
        assert!(long.starts_with(truncated));
        assert_eq!(truncate_for_log("short"), "short");
    }
}
