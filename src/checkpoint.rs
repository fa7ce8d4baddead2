//! Processed-image log used as the preprocessing resumability checkpoint
//!
//! The log is a UTF-8 text file with one base filename per line. It is only
//! ever appended to. Loading treats it as a set, so duplicate or blank lines
//! left by an interrupted or hand-edited log are harmless.

use crate::error::{DatasetError, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only, filename-keyed record of completed images
#[derive(Debug)]
pub struct ProcessedLog {
    path: PathBuf,
    entries: HashSet<String>,
    writer: File,
}

impl ProcessedLog {
    /// Open (or create) the log at `path` and load its entries
    ///
    /// # Errors
    /// - The log exists but cannot be read or is not valid UTF-8
    /// - The log or its parent directory cannot be created or opened for append
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let existing = if path.exists() {
            fs::read_to_string(&path)
                .map_err(|e| DatasetError::file_io_error("read processed log", &path, &e))?
        } else {
            String::new()
        };

        let entries = parse_entries(&existing);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                DatasetError::file_io_error("create log directory", parent, &e)
            })?;
        }

        let mut writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DatasetError::file_io_error("open processed log", &path, &e))?;

        // A torn final line would otherwise merge with the next append
        if !existing.is_empty() && !existing.ends_with('\n') {
            writer
                .write_all(b"\n")
                .map_err(|e| DatasetError::file_io_error("repair processed log", &path, &e))?;
        }

        log::debug!(
            "Loaded {} processed entries from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries,
            writer,
        })
    }

    /// Whether `file_name` has already completed preprocessing
    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains(file_name)
    }

    /// Commit `file_name` as processed
    ///
    /// The line is flushed and synced before the in-memory set is updated.
    /// Returns `false` without writing if the name is already present.
    ///
    /// # Errors
    /// - The name contains a line break
    /// - Writing or syncing the log fails
    pub fn record(&mut self, file_name: &str) -> Result<bool> {
        if self.entries.contains(file_name) {
            return Ok(false);
        }
        if file_name.is_empty() || file_name.contains(['\n', '\r']) {
            return Err(DatasetError::invalid_config(format!(
                "cannot record {:?} in processed log",
                file_name
            )));
        }

        self.writer
            .write_all(format!("{}\n", file_name).as_bytes())
            .and_then(|()| self.writer.flush())
            .and_then(|()| self.writer.sync_data())
            .map_err(|e| DatasetError::file_io_error("append to processed log", &self.path, &e))?;

        self.entries.insert(file_name.to_string());
        Ok(true)
    }

    /// Number of distinct processed filenames
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_entries(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
