//! Progress reporting for batch jobs
//!
//! Keeps progress display out of the job logic so the CLI can render
//! progress bars while library callers stay silent.

/// Which batch a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Image downloads for one collection query
    Download,
    /// Preprocessing of the dataset tree
    Preprocess,
}

/// How a single batch item ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    /// Already done in an earlier run
    Skipped,
    Failed,
}

/// Receiver of batch progress events
///
/// Download events arrive concurrently from worker tasks.
pub trait ProgressReporter: Send + Sync {
    /// A batch of `total` items is starting
    fn batch_started(&self, _kind: BatchKind, _label: &str, _total: usize) {}

    /// One item finished
    fn item_finished(&self, _kind: BatchKind, _item: &str, _outcome: ItemOutcome) {}

    /// The batch is done
    fn batch_finished(&self, _kind: BatchKind, _label: &str) {}
}

/// Reporter that discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {}
