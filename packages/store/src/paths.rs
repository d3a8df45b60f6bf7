#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the storage root.
//!
//! ```text
//! <root>/data/current_calls.json
//! <root>/data/historical_log.txt
//! <root>/data/archive/<YYYY-MM-DD>.json
//! <root>/data/.run.lock
//! <root>/data/.commit.journal
//! <root>/analysis/stats.json
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Resolves every persisted file relative to one storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Creates paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `data/` directory path.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Returns the `data/archive/` directory for per-day archives.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir().join("archive")
    }

    /// Returns the `analysis/` directory.
    #[must_use]
    pub fn analysis_dir(&self) -> PathBuf {
        self.root.join("analysis")
    }

    /// Returns the path of the current snapshot.
    #[must_use]
    pub fn current_calls(&self) -> PathBuf {
        self.data_dir().join("current_calls.json")
    }

    /// Returns the path of the append-only activity log.
    #[must_use]
    pub fn historical_log(&self) -> PathBuf {
        self.data_dir().join("historical_log.txt")
    }

    /// Returns the archive path for one calendar day.
    #[must_use]
    pub fn archive_day(&self, day: NaiveDate) -> PathBuf {
        self.archive_dir()
            .join(format!("{}.json", day.format("%Y-%m-%d")))
    }

    /// Returns the path of the cumulative statistics file.
    #[must_use]
    pub fn stats(&self) -> PathBuf {
        self.analysis_dir().join("stats.json")
    }

    /// Returns the path of the run lock file.
    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.data_dir().join(".run.lock")
    }

    /// Returns the path of the journal kept while a commit is in flight.
    #[must_use]
    pub fn commit_journal(&self) -> PathBuf {
        self.data_dir().join(".commit.journal")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
