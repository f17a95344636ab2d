//! Scratch directory owned by one fixture instance.

use crate::error::{DirectoryError, DirectoryResult};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

/// Working directories currently owned by a live instance in this process.
fn claimed() -> &'static Mutex<HashSet<PathBuf>> {
    static CLAIMED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive ownership of one working directory, released on drop.
#[derive(Debug)]
pub struct WorkDirLease {
    key: PathBuf,
}

impl Drop for WorkDirLease {
    fn drop(&mut self) {
        if let Ok(mut claimed) = claimed().lock() {
            claimed.remove(&self.key);
        }
    }
}

/// The filesystem root of one directory instance.
///
/// [`WorkingDirectory::prepare`] always starts from an empty directory, and
/// [`WorkingDirectory::dispose`] leaves nothing behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    path: PathBuf,
}

impl WorkingDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Takes exclusive ownership of the path for this process. Fails with
    /// [`DirectoryError::Filesystem`] while another lease on it is alive.
    pub fn claim(&self) -> DirectoryResult<WorkDirLease> {
        let key = std::path::absolute(&self.path).map_err(|source| self.fs_error(source))?;
        if !claimed().lock().unwrap().insert(key.clone()) {
            return Err(self.fs_error(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "working directory is owned by another instance",
            )));
        }
        debug!(path = %self.path.display(), "working directory claimed");
        Ok(WorkDirLease { key })
    }

    /// Deletes any stale copy, then creates the directory and its parents.
    pub fn prepare(&self) -> DirectoryResult<()> {
        if self.path.is_dir() {
            debug!(path = %self.path.display(), "removing stale working directory");
            fs::remove_dir_all(&self.path).map_err(|source| self.fs_error(source))?;
        } else if self.path.exists() {
            let not_dir = io::Error::new(io::ErrorKind::AlreadyExists, "not a directory");
            return Err(self.fs_error(not_dir));
        }
        fs::create_dir_all(&self.path).map_err(|source| self.fs_error(source))?;
        info!(path = %self.path.display(), "working directory prepared");
        Ok(())
    }

    /// Removes the directory recursively. Missing directories are fine.
    pub fn dispose(&self) -> DirectoryResult<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "working directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.fs_error(source)),
        }
    }

    fn fs_error(&self, source: io::Error) -> DirectoryError {
        DirectoryError::Filesystem {
            path: self.path.clone(),
            source,
        }
    }
}
