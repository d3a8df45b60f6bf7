#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persisted state of the active calls tracker.
//!
//! The [`SnapshotStore`] trait is the read-modify-write contract the
//! pipeline runs against: one current snapshot, one archive per calendar
//! day, an append-only activity log, and the cumulative statistics.
//! [`fs_store::FsSnapshotStore`] implements it on a local directory.

pub mod atomic;
pub mod fs_store;
pub mod lock;
pub mod paths;

use std::path::Path;

use active_calls_models::{IncidentRecord, RunningStatistics, Snapshot};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use fs_store::FsSnapshotStore;
pub use lock::RunLock;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error on a persisted file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A persisted file could not be encoded or decoded.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// File involved.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Another run holds the lock.
    #[error("Another run holds the lock at {path}")]
    Locked {
        /// Lock file path.
        path: String,
    },
}

impl StoreError {
    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Wraps a JSON error with the path it occurred on.
    #[must_use]
    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

/// All snapshots captured on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDay {
    /// The calendar day.
    pub date: NaiveDate,
    /// Snapshots in capture order.
    pub snapshots: Vec<ArchiveEntry>,
}

/// One archived snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Capture time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Number of active calls.
    pub call_count: usize,
    /// Active calls, ordered by incident number.
    pub calls: Vec<IncidentRecord>,
}

impl From<&Snapshot> for ArchiveEntry {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.captured_at,
            call_count: snapshot.len(),
            calls: snapshot.records.values().cloned().collect(),
        }
    }
}

/// Read-modify-write contract over the persisted tracker state.
///
/// Every write either fully happens or leaves the previous content in
/// place. Callers must hold [`SnapshotStore::lock`] for the whole run.
pub trait SnapshotStore {
    /// Takes exclusive ownership of the state for one run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another run is in flight.
    fn lock(&self) -> Result<RunLock, StoreError> {
        Ok(RunLock::unlocked())
    }

    /// Loads the current snapshot, or an empty one on first run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot exists but cannot be read.
    fn load_current(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn save_current(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Adds a snapshot to the given day's archive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the archive cannot be read or written.
    fn append_archive(&self, day: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Appends lines to the activity log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the append fails.
    fn append_log(&self, lines: &[String]) -> Result<(), StoreError>;

    /// Whether the activity log exists and has content.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the log cannot be inspected.
    fn has_log(&self) -> Result<bool, StoreError>;

    /// Loads the cumulative statistics, or empty ones on first run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the statistics exist but cannot be read.
    fn load_statistics(&self) -> Result<RunningStatistics, StoreError>;

    /// Replaces the cumulative statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn save_statistics(&self, stats: &RunningStatistics) -> Result<(), StoreError>;

    /// Persists the end-of-run snapshot and statistics together.
    ///
    /// The default saves them one after the other; implementations that
    /// can fail between the two writes must override it so that either
    /// both are replaced or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if either write fails.
    fn commit(&self, snapshot: &Snapshot, stats: &RunningStatistics) -> Result<(), StoreError> {
        self.save_current(snapshot)?;
        self.save_statistics(stats)
    }
}
