//! All-or-nothing file replacement.
//!
//! Content is written to a `.tmp` sibling, flushed, and renamed over the
//! target. A [`StagedFile`] defers the rename so several files can be
//! written first and swapped in together; dropping it without committing
//! removes the temp file and leaves the target untouched.
//!
//! [`commit_all`] swaps a group of staged files in as one unit. Before the
//! first rename it hard-links every existing target to a `.bak` sibling and
//! records them in a journal. Removing the journal is the commit point: a
//! rename failure restores the backups immediately, and a journal left
//! behind by a crash is rolled back by [`recover`].

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StoreError;
use crate::paths::ensure_dir;

/// A fully written temp file waiting to replace its target.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Writes `contents` to the temp sibling of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory cannot be created
    /// or the temp file cannot be written.
    pub fn stage(target: &Path, contents: &[u8]) -> Result<Self, StoreError> {
        if let Some(parent) = target.parent() {
            ensure_dir(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp = tmp_path(target);
        let staged = Self {
            tmp,
            target: target.to_path_buf(),
            committed: false,
        };

        let mut file =
            std::fs::File::create(&staged.tmp).map_err(|e| StoreError::io(&staged.tmp, e))?;
        file.write_all(contents)
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::io(&staged.tmp, e))?;

        Ok(staged)
    }

    /// Renames the temp file over the target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the rename fails; the target is then
    /// unchanged.
    pub fn commit(mut self) -> Result<(), StoreError> {
        std::fs::rename(&self.tmp, &self.target).map_err(|e| StoreError::io(&self.target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed
            && self.tmp.is_file()
            && let Err(e) = std::fs::remove_file(&self.tmp)
        {
            log::warn!("Failed to remove {}: {e}", self.tmp.display());
        }
    }
}

/// Replaces `target` with `contents` atomically.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if staging or the rename fails.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), StoreError> {
    StagedFile::stage(target, contents)?.commit()
}

/// Files touched by an in-flight [`commit_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CommitJournal {
    entries: Vec<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JournalEntry {
    target: PathBuf,
    /// Hard link to the previous content; `None` if the target was absent.
    backup: Option<PathBuf>,
}

/// Renames every staged file over its target, or none of them.
///
/// `journal` must live on the same filesystem as the targets.
///
/// # Errors
///
/// Returns [`StoreError`] if a backup, the journal, or a rename fails.
/// Targets renamed before the failure are restored from their backups.
pub fn commit_all(files: Vec<StagedFile>, journal: &Path) -> Result<(), StoreError> {
    let entries = begin(&files, journal)?;

    for (applied, file) in files.into_iter().enumerate() {
        if let Err(e) = file.commit() {
            log::error!("Commit failed after {applied} of {} renames: {e}", entries.len());
            match roll_back(&entries, applied, journal) {
                Ok(()) => log::info!("Restored previous content of {applied} files"),
                Err(rollback) => log::error!(
                    "Rollback failed, {} kept for recovery: {rollback}",
                    journal.display()
                ),
            }
            return Err(e);
        }
    }

    std::fs::remove_file(journal).map_err(|e| StoreError::io(journal, e))?;
    discard_backups(&entries);
    Ok(())
}

/// Rolls back a [`commit_all`] interrupted before its commit point.
/// Returns whether a journal was found.
///
/// # Errors
///
/// Returns [`StoreError`] if the journal cannot be read or a target cannot
/// be restored; the journal is then kept for the next attempt.
pub fn recover(journal: &Path) -> Result<bool, StoreError> {
    let content = match std::fs::read(journal) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StoreError::io(journal, e)),
    };
    let CommitJournal { entries } =
        serde_json::from_slice(&content).map_err(|e| StoreError::json(journal, e))?;

    log::warn!(
        "Found interrupted commit at {}; restoring {} files",
        journal.display(),
        entries.len()
    );
    roll_back(&entries, entries.len(), journal)?;
    Ok(true)
}

/// Backs up every existing target and writes the journal.
fn begin(files: &[StagedFile], journal: &Path) -> Result<Vec<JournalEntry>, StoreError> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let backup = if file.target.is_file() {
            let backup = backup_path(&file.target);
            if let Err(e) = link_backup(&file.target, &backup) {
                discard_backups(&entries);
                return Err(StoreError::io(&backup, e));
            }
            Some(backup)
        } else {
            None
        };
        entries.push(JournalEntry {
            target: file.target.clone(),
            backup,
        });
    }

    let journal_data = CommitJournal { entries };
    let written = serde_json::to_vec_pretty(&journal_data)
        .map_err(|e| StoreError::json(journal, e))
        .and_then(|bytes| write_atomic(journal, &bytes));
    if let Err(e) = written {
        discard_backups(&journal_data.entries);
        return Err(e);
    }
    Ok(journal_data.entries)
}

fn link_backup(target: &Path, backup: &Path) -> std::io::Result<()> {
    remove_if_present(backup)?;
    std::fs::hard_link(target, backup).or_else(|e| {
        log::debug!("Hard link to {} failed ({e}); copying", backup.display());
        std::fs::copy(target, backup).map(|_| ())
    })
}

/// Restores the first `applied` entries, drops the other backups, then
/// removes the journal.
fn roll_back(entries: &[JournalEntry], applied: usize, journal: &Path) -> Result<(), StoreError> {
    for entry in &entries[..applied] {
        restore(entry)?;
    }
    discard_backups(&entries[applied..]);
    remove_if_present(journal).map_err(|e| StoreError::io(journal, e))
}

fn restore(entry: &JournalEntry) -> Result<(), StoreError> {
    match &entry.backup {
        Some(backup) => match std::fs::rename(backup, &entry.target) {
            // Already restored by an earlier rollback.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            result => result.map_err(|e| StoreError::io(&entry.target, e)),
        },
        None if entry.target.is_file() => {
            remove_if_present(&entry.target).map_err(|e| StoreError::io(&entry.target, e))
        }
        None => Ok(()),
    }
}

fn discard_backups(entries: &[JournalEntry]) {
    for backup in entries.iter().filter_map(|entry| entry.backup.as_deref()) {
        if let Err(e) = remove_if_present(backup) {
            log::warn!("Failed to remove {}: {e}", backup.display());
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    sibling(target, ".tmp")
}

fn backup_path(target: &Path) -> PathBuf {
    sibling(target, ".bak")
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    target.with_file_name(name)
}
