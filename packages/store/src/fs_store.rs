//! [`SnapshotStore`] backed by JSON and text files in a local directory.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use active_calls_models::{RunningStatistics, Snapshot};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::atomic::{self, StagedFile, write_atomic};
use crate::lock::{DEFAULT_STALE_AFTER, RunLock};
use crate::paths::{StoragePaths, ensure_dir};
use crate::{ArchiveDay, ArchiveEntry, SnapshotStore, StoreError};

/// File-backed store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    paths: StoragePaths,
    stale_after: Duration,
}

impl FsSnapshotStore {
    /// Creates a store rooted at `root`. Nothing is touched until the
    /// first read or write.
    #[must_use]
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            paths: StoragePaths::new(root),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Overrides the age after which a leftover lock file is taken over.
    #[must_use]
    pub const fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Persisted file locations.
    #[must_use]
    pub const fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Loads one day's archive, if any snapshot was archived that day.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the archive exists but cannot be read.
    pub fn load_archive(&self, day: NaiveDate) -> Result<Option<ArchiveDay>, StoreError> {
        read_json(&self.paths.archive_day(day))
    }
}

impl SnapshotStore for FsSnapshotStore {
    /// Also rolls back a commit that a crashed run left half-applied.
    fn lock(&self) -> Result<RunLock, StoreError> {
        let lock = RunLock::acquire(&self.paths.lock(), self.stale_after)?;
        if atomic::recover(&self.paths.commit_journal())? {
            log::warn!("Rolled back an interrupted commit");
        }
        Ok(lock)
    }

    fn load_current(&self) -> Result<Snapshot, StoreError> {
        let snapshot: Option<Snapshot> = read_json(&self.paths.current_calls())?;
        Ok(snapshot.unwrap_or_else(|| {
            log::info!("No current snapshot found; starting from empty");
            Snapshot::default()
        }))
    }

    fn save_current(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.paths.current_calls();
        write_atomic(&path, &to_json(&path, snapshot)?)
    }

    fn append_archive(&self, day: NaiveDate, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.paths.archive_day(day);
        let mut archive = read_json::<ArchiveDay>(&path)?.unwrap_or_else(|| ArchiveDay {
            date: day,
            snapshots: Vec::new(),
        });

        archive.snapshots.push(ArchiveEntry::from(snapshot));
        log::info!(
            "Archiving snapshot {} of {} ({} calls)",
            archive.snapshots.len(),
            day,
            snapshot.len()
        );

        write_atomic(&path, &to_json(&path, &archive)?)
    }

    fn append_log(&self, lines: &[String]) -> Result<(), StoreError> {
        let path = self.paths.historical_log();
        if let Some(parent) = path.parent() {
            ensure_dir(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(buf.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::io(&path, e))
    }

    fn has_log(&self) -> Result<bool, StoreError> {
        let path = self.paths.historical_log();
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn load_statistics(&self) -> Result<RunningStatistics, StoreError> {
        Ok(read_json(&self.paths.stats())?.unwrap_or_default())
    }

    fn save_statistics(&self, stats: &RunningStatistics) -> Result<(), StoreError> {
        let path = self.paths.stats();
        write_atomic(&path, &to_json(&path, stats)?)
    }

    /// Stages both files, then swaps them in through the commit journal, so
    /// a failed write or rename leaves both previous files in place.
    fn commit(&self, snapshot: &Snapshot, stats: &RunningStatistics) -> Result<(), StoreError> {
        let snapshot_path = self.paths.current_calls();
        let stats_path = self.paths.stats();

        let staged = vec![
            StagedFile::stage(&snapshot_path, &to_json(&snapshot_path, snapshot)?)?,
            StagedFile::stage(&stats_path, &to_json(&stats_path, stats)?)?,
        ];
        atomic::commit_all(staged, &self.paths.commit_journal())?;

        log::info!(
            "Committed snapshot ({} calls) and statistics ({} snapshots processed)",
            snapshot.len(),
            stats.total_snapshots_processed
        );
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::json(path, e))
}

fn to_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))
}
