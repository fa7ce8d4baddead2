//! Progress bars for collection and preprocessing batches

use crate::progress::{BatchKind, ItemOutcome, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// One indicatif bar per running batch
#[derive(Debug, Default)]
pub struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
    hidden: bool,
}

impl IndicatifReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter whose bars never draw, for non-interactive output
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: Mutex::new(None),
            hidden: true,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn batch_started(&self, kind: BatchKind, label: &str, total: usize) {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_length(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        let prefix = match kind {
            BatchKind::Download => "⬇️",
            BatchKind::Preprocess => "🖼️",
        };
        bar.set_message(format!("{} {}", prefix, label));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(previous) = guard.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn item_finished(&self, _kind: BatchKind, item: &str, outcome: ItemOutcome) {
        self.with_bar(|bar| {
            if outcome == ItemOutcome::Failed {
                bar.println(format!("❌ {}", item));
            }
            bar.inc(1);
        });
    }

    fn batch_finished(&self, _kind: BatchKind, label: &str) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_with_message(format!("✅ {}", label));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_tracks_position() {
        let reporter = IndicatifReporter::hidden();
        reporter.batch_started(BatchKind::Preprocess, "data", 3);
        reporter.item_finished(BatchKind::Preprocess, "a.jpg", ItemOutcome::Completed);
        reporter.item_finished(BatchKind::Preprocess, "b.jpg", ItemOutcome::Skipped);

        let position = reporter
            .bar
            .lock()
            .unwrap()
            .as_ref()
            .map(ProgressBar::position);
        assert_eq!(position, Some(2));

        reporter.batch_finished(BatchKind::Preprocess, "data");
        assert!(reporter.bar.lock().unwrap().is_none());
    }

    #[test]
    fn test_events_without_batch_are_ignored() {
        let reporter = IndicatifReporter::hidden();
        reporter.item_finished(BatchKind::Download, "x", ItemOutcome::Failed);
        reporter.batch_finished(BatchKind::Download, "x");
    }
}
