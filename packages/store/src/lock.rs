//! Single-run exclusivity over the persisted state.
//!
//! The lock is a file created with create-new semantics and removed when
//! the [`RunLock`] guard drops. A lock file older than the staleness
//! window is assumed to belong to a run that crashed and is taken over.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::StoreError;
use crate::paths::ensure_dir;

/// Age after which an existing lock file is considered abandoned.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Guard proving this process owns the run lock.
#[derive(Debug)]
pub struct RunLock {
    path: Option<PathBuf>,
}

impl RunLock {
    /// A guard for stores that have no lock file.
    #[must_use]
    pub const fn unlocked() -> Self {
        Self { path: None }
    }

    /// Creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if a fresh lock file already exists,
    /// or [`StoreError::Io`] if the file cannot be created.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        match create_lock_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !is_stale(path, stale_after) {
                    return Err(StoreError::Locked {
                        path: path.display().to_string(),
                    });
                }
                log::warn!(
                    "Taking over stale run lock {} (older than {stale_after:?})",
                    path.display()
                );
                std::fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
                create_lock_file(path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => StoreError::Locked {
                        path: path.display().to_string(),
                    },
                    _ => StoreError::io(path, e),
                })?;
            }
            Err(e) => return Err(StoreError::io(path, e)),
        }

        log::debug!("Acquired run lock {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = std::fs::remove_file(&path)
        {
            log::warn!("Failed to release run lock {}: {e}", path.display());
        }
    }
}

fn create_lock_file(path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{}", std::process::id())
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}
